//! MsgPack codec using `rmp-serde`.
//!
//! **CRITICAL**: structs go out with `to_vec_named` / `with_struct_map`,
//! never positional. Peers written against `@msgpack/msgpack` decode
//! structs as maps, and the header must keep its field names on the wire.
//! Positional encoding is opt-in and explicit, through the compact schema
//! codecs in [`crate::codec::compact`].
//!
//! # Example
//!
//! ```
//! use typhoon::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Heal {
//!     heal_needed: u32,
//!     consider_enc: bool,
//! }
//!
//! let msg = Heal { heal_needed: 2, consider_enc: true };
//! let encoded = MsgPackCodec::encode(&msg).unwrap();
//! let decoded: Heal = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::error::{Result, TyphoonError};

/// MessagePack codec for single values.
///
/// Multi-value frames are built with [`crate::protocol::FrameBuilder`] and
/// read back with [`crate::protocol::FrameDecoder`].
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (structs as maps).
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Append the encoding of `value` to `buf`.
    ///
    /// Frames are concatenations of values, so this is the building block
    /// for every frame writer.
    pub fn encode_into<T: Serialize + ?Sized>(buf: &mut BytesMut, value: &T) -> Result<()> {
        let mut writer = buf.writer();
        let mut ser = rmp_serde::Serializer::new(&mut writer).with_struct_map();
        value.serialize(&mut ser)?;
        Ok(())
    }

    /// Decode exactly one value from `bytes`.
    ///
    /// Trailing bytes after the first value are ignored; use a
    /// [`crate::protocol::FrameDecoder`] for multi-value input.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        rmp_serde::from_slice(bytes).map_err(|source| TyphoonError::Decode { offset: 0, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    #[serde(rename_all = "camelCase")]
    struct CalcRequest {
        heal_needed: u32,
        consider_enc: bool,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = CalcRequest {
            heal_needed: 2,
            consider_enc: true,
        };

        let encoded = MsgPackCodec::encode(&original).unwrap();
        let decoded: CalcRequest = MsgPackCodec::decode(&encoded).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_struct_is_encoded_as_map() {
        let encoded = MsgPackCodec::encode(&CalcRequest {
            heal_needed: 0,
            consider_enc: false,
        })
        .unwrap();

        // fixmap with 2 entries, not fixarray (0x92)
        assert_eq!(encoded[0], 0x82, "Expected fixmap, got {:02X}", encoded[0]);
    }

    #[test]
    fn test_encode_into_appends_and_matches_encode() {
        let value = CalcRequest {
            heal_needed: 7,
            consider_enc: true,
        };

        let mut buf = BytesMut::new();
        MsgPackCodec::encode_into(&mut buf, &1u8).unwrap();
        MsgPackCodec::encode_into(&mut buf, &value).unwrap();

        let standalone = MsgPackCodec::encode(&value).unwrap();
        assert_eq!(buf[0], 0x01);
        assert_eq!(&buf[1..], &standalone[..]);
    }

    #[test]
    fn test_option_is_nil() {
        let encoded = MsgPackCodec::encode(&None::<u32>).unwrap();
        assert_eq!(encoded, vec![0xc0]);

        let decoded: Option<u32> = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn test_dynamic_json_value() {
        let value = serde_json::json!({ "healNeeded": 2, "considerEnc": true });
        let encoded = MsgPackCodec::encode(&value).unwrap();
        let decoded: CalcRequest = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.heal_needed, 2);
        assert!(decoded.consider_enc);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        // 0xc1 is the one marker MsgPack never assigns
        let result: Result<CalcRequest> = MsgPackCodec::decode(&[0xc1]);
        let err = result.unwrap_err();
        assert!(err.is_decode());
        assert!(err.to_string().contains("byte 0"));
    }
}
