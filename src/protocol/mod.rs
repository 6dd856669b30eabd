//! Protocol module - headers, frame encoding, and pull decoding.
//!
//! A frame is a header map followed by zero or more payload values, each an
//! independent MessagePack value:
//! - [`Header`] / [`Action`] - the first value of every frame
//! - [`encode`] / [`FrameBuilder`] - write a frame
//! - [`FrameDecoder`] / [`AsyncFrameDecoder`] - pull values one at a time
//! - [`Frame`] - a fully materialized frame for logging and tests

mod decoder;
mod frame;
mod header;

pub use decoder::{
    AsyncFrameDecoder, DecoderConfig, FrameDecoder, DEFAULT_MAX_VALUE_SIZE,
    DEFAULT_READ_CHUNK_SIZE,
};
pub use frame::{encode, Frame, FrameBuilder};
pub use header::{Action, Header, PROTOCOL, PROTOCOL_VERSION};
