//! Error types for typhoon.

use thiserror::Error;

use crate::codec::compact::SchemaError;

/// Main error type for all typhoon operations.
#[derive(Debug, Error)]
pub enum TyphoonError {
    /// I/O error while pulling bytes from a frame source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON conversion error (dynamic payloads and typed bridging).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// Malformed bytes in a frame.
    ///
    /// `offset` is the absolute byte offset where the failing value starts.
    #[error("decode error at byte {offset}: {source}")]
    Decode {
        /// Offset of the first byte of the value that failed to decode.
        offset: u64,
        /// Underlying MsgPack error.
        #[source]
        source: rmp_serde::decode::Error,
    },

    /// Pulled past the last value of a frame.
    ///
    /// This is the normal end of a frame, not corruption.
    #[error("stream exhausted")]
    StreamExhausted,

    /// A single value exceeded the decoder's buffering limit.
    #[error("value at byte {offset} exceeds maximum size of {max} bytes")]
    ValueTooLarge {
        /// Offset of the first byte of the oversized value.
        offset: u64,
        /// Configured maximum.
        max: usize,
    },

    /// Compact schema transform failed.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Protocol error (wrong protocol tag, unsupported version, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No handler registered under the given name.
    #[error("Handler not found: {0}")]
    HandlerNotFound(String),

    /// A handler with this name is already registered.
    #[error("Handler already registered: {0}")]
    DuplicateHandler(String),

    /// A handler validator rejected a value.
    #[error("validation failed: {0}")]
    Validation(#[from] crate::handler::ValidationError),

    /// A lifecycle task ended with an error.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl TyphoonError {
    /// True for the expected end-of-frame condition.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, TyphoonError::StreamExhausted)
    }

    /// True when the bytes themselves were malformed or truncated.
    #[inline]
    pub fn is_decode(&self) -> bool {
        matches!(self, TyphoonError::Decode { .. })
    }
}

/// Result type alias using TyphoonError.
pub type Result<T> = std::result::Result<T, TyphoonError>;
