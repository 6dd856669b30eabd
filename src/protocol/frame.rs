//! Frame encoding and the materialized [`Frame`] type.
//!
//! A frame is the concatenation of independently encoded MsgPack values with
//! no outer length prefix: the header first, then zero or more payload
//! values. Encoding is a plain loop; decoding is pull-based (see
//! [`FrameDecoder`](super::FrameDecoder)) because the reader decides how many
//! values to take.
//!
//! # Example
//!
//! ```
//! use typhoon::protocol::{encode, Frame, Header};
//!
//! let header = Header::once("abc-123", "calc.bot");
//! let bytes = encode(&header, &[2u32]).unwrap();
//!
//! let frame = Frame::parse(&bytes).unwrap();
//! assert_eq!(frame.id(), "abc-123");
//! assert_eq!(frame.values, vec![serde_json::json!(2)]);
//! ```

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde_json::Value;

use super::decoder::FrameDecoder;
use super::header::{Action, Header};
use crate::codec::compact::CompactSchema;
use crate::codec::MsgPackCodec;
use crate::error::Result;

/// Encode `header` followed by every element of `values`.
///
/// Each value is its own top-level MsgPack value; the slice is never wrapped
/// in an array. An empty slice yields a header-only frame.
pub fn encode<T: Serialize>(header: &Header, values: &[T]) -> Result<Bytes> {
    let mut builder = FrameBuilder::new(header)?;
    for value in values {
        builder.push(value)?;
    }
    Ok(builder.finish())
}

/// Incremental frame encoder for heterogeneous payloads.
///
/// ```
/// use typhoon::protocol::{FrameBuilder, Header};
///
/// let mut builder = FrameBuilder::new(&Header::update("7", true)).unwrap();
/// builder.push(&1u8).unwrap().push(&"two").unwrap();
/// assert_eq!(builder.value_count(), 2);
/// let _bytes = builder.finish();
/// ```
#[derive(Debug)]
pub struct FrameBuilder {
    buf: BytesMut,
    values: usize,
}

impl FrameBuilder {
    /// Start a frame with `header` already written.
    pub fn new(header: &Header) -> Result<Self> {
        let mut buf = BytesMut::with_capacity(64);
        MsgPackCodec::encode_into(&mut buf, header)?;
        Ok(Self { buf, values: 0 })
    }

    /// Append one payload value.
    pub fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        MsgPackCodec::encode_into(&mut self.buf, value)?;
        self.values += 1;
        Ok(self)
    }

    /// Append one payload value after running it through `schema`.
    pub fn push_compact<T: Serialize + ?Sized>(
        &mut self,
        schema: &CompactSchema,
        value: &T,
    ) -> Result<&mut Self> {
        let wire = schema.encode_from(value)?;
        self.push(&wire)
    }

    /// Payload values written so far (header excluded).
    #[inline]
    pub fn value_count(&self) -> usize {
        self.values
    }

    /// Encoded size so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if no bytes have been written. A builder from
    /// [`new`](Self::new) already holds the header, so this is `false`
    /// from the start.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and return the frame bytes.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// A fully materialized frame: header plus every payload value as dynamic data.
///
/// Useful for logging and tests. Hot paths should pull typed values from a
/// [`FrameDecoder`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Decoded and validated header.
    pub header: Header,
    /// Payload values in order.
    pub values: Vec<Value>,
}

impl Frame {
    /// Create a frame with no payload values.
    pub fn new(header: Header) -> Self {
        Self {
            header,
            values: Vec::new(),
        }
    }

    /// Append a payload value.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }

    /// Decode `bytes` until the source is exhausted.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut decoder = FrameDecoder::from_bytes(bytes);
        let header = decoder.next_header()?;

        let mut values = Vec::new();
        loop {
            match decoder.next::<Value>() {
                Ok(value) => values.push(value),
                Err(e) if e.is_exhausted() => break,
                Err(e) => return Err(e),
            }
        }

        Ok(Self { header, values })
    }

    /// Encode back to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        encode(&self.header, &self.values)
    }

    /// Correlation id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.header.id
    }

    /// Frame action.
    #[inline]
    pub fn action(&self) -> Action {
        self.header.action
    }

    /// Target handler, if any.
    #[inline]
    pub fn handler(&self) -> Option<&str> {
        self.header.handler.as_deref()
    }

    /// First payload value.
    #[inline]
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_is_concatenation() {
        let header = Header::once("1", "calc.bot");
        let frame = encode(&header, &[1u8, 2u8]).unwrap();

        let mut expected = header.encode().unwrap();
        expected.extend_from_slice(&[0x01, 0x02]);
        assert_eq!(&frame[..], &expected[..]);
    }

    #[test]
    fn test_header_only_frame() {
        let header = Header::subscribe("1", "rooms");
        let frame = encode::<()>(&header, &[]).unwrap();
        assert_eq!(&frame[..], &header.encode().unwrap()[..]);

        let parsed = Frame::parse(&frame).unwrap();
        assert_eq!(parsed.header, header);
        assert!(parsed.values.is_empty());
    }

    #[test]
    fn test_builder_mixed_values() {
        let mut builder = FrameBuilder::new(&Header::update("9", true)).unwrap();
        assert!(!builder.is_empty());
        assert_eq!(builder.value_count(), 0);
        builder
            .push(&json!({ "heal": 2 }))
            .unwrap()
            .push("done")
            .unwrap();
        assert_eq!(builder.value_count(), 2);
        assert!(!builder.is_empty());

        let frame = Frame::parse(&builder.finish()).unwrap();
        assert_eq!(frame.values, vec![json!({ "heal": 2 }), json!("done")]);
        assert_eq!(frame.action(), Action::ServerUpdate);
        assert_eq!(frame.handler(), None);
    }

    #[test]
    fn test_builder_compact_value() {
        let schema = CompactSchema::literal(["tank", "healer", "dps"]);
        let mut builder = FrameBuilder::new(&Header::once("2", "role")).unwrap();
        builder.push_compact(&schema, "dps").unwrap();

        let frame = Frame::parse(&builder.finish()).unwrap();
        assert_eq!(frame.first(), Some(&json!(2)));
    }

    #[test]
    fn test_frame_encode_parse() {
        let frame = Frame::new(Header::once("abc", "calc.bot"))
            .with_value(json!([1, null]))
            .with_value(true);
        let parsed = Frame::parse(&frame.encode().unwrap()).unwrap();
        assert_eq!(parsed, frame);
        assert_eq!(parsed.id(), "abc");
    }

    #[test]
    fn test_parse_rejects_foreign_protocol() {
        let mut header = Header::once("1", "calc.bot");
        header.protocol = "other".into();
        let bytes = encode(&header, &[1u8]).unwrap();
        assert!(Frame::parse(&bytes).is_err());
    }
}
