//! Codec module - serialization for frame values.
//!
//! - [`MsgPackCodec`] - single values via `rmp-serde` (structs as maps)
//! - [`compact`] - schema transforms that shrink payloads before encoding
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so codec selection happens at compile time. Compact schemas are plain
//! data ([`compact::CompactSchema`]) so they can be built once per handler
//! and shared.
//!
//! # Example
//!
//! ```
//! use typhoon::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

pub mod compact;
mod msgpack;

pub use msgpack::MsgPackCodec;
