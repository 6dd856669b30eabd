//! Pull-based frame decoder.
//!
//! Frames have no outer length prefix, so the decoder cannot know where a
//! frame ends until its source runs dry. Instead the caller pulls one value
//! at a time and decides how many to take:
//!
//! - a value is returned as soon as its bytes are complete
//! - a partial value makes the decoder read another chunk from the source;
//!   a marker-level size scan decides when the value is complete, so each
//!   value is deserialized once however many reads it spans
//! - an empty buffer at end of source is [`TyphoonError::StreamExhausted`]
//! - anything else that fails is [`TyphoonError::Decode`] with the offset
//!   of the failing value
//!
//! Only the value currently being assembled is buffered, bounded by
//! [`DecoderConfig::max_value_size`].
//!
//! # Example
//!
//! ```
//! use typhoon::protocol::{encode, FrameDecoder, Header};
//!
//! let bytes = encode(&Header::once("abc-123", "calc.bot"), &[2u32]).unwrap();
//! let mut decoder = FrameDecoder::from_bytes(bytes);
//!
//! let header = decoder.next_header().unwrap();
//! assert_eq!(header.id, "abc-123");
//! assert_eq!(decoder.next::<u32>().unwrap(), 2);
//! assert!(decoder.next::<u32>().unwrap_err().is_exhausted());
//! ```

use std::io::{self, Cursor, Read};

use bytes::{Buf, BytesMut};
use rmp::decode::ValueReadError;
use rmp::Marker;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::header::Header;
use crate::codec::compact::CompactSchema;
use crate::error::{Result, TyphoonError};

/// Default bytes requested from the source per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// Default limit on the encoded size of a single value (64 MiB).
pub const DEFAULT_MAX_VALUE_SIZE: usize = 64 * 1024 * 1024;

/// Decoder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Bytes requested from the source per read.
    pub read_chunk_size: usize,
    /// A partial value larger than this fails with [`TyphoonError::ValueTooLarge`].
    pub max_value_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl DecoderConfig {
    /// Create config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read chunk size (at least one byte).
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Set the per-value size limit.
    pub fn with_max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }
}

type RawResult<T> = std::result::Result<T, rmp_serde::decode::Error>;

fn read_value<T: DeserializeOwned>(cursor: &mut Cursor<&[u8]>) -> RawResult<T> {
    T::deserialize(&mut rmp_serde::Deserializer::new(cursor))
}

fn read_array_len(cursor: &mut Cursor<&[u8]>) -> RawResult<u32> {
    use rmp_serde::decode::Error;

    rmp::decode::read_array_len(cursor).map_err(|e| match e {
        ValueReadError::InvalidMarkerRead(io) => Error::InvalidMarkerRead(io),
        ValueReadError::InvalidDataRead(io) => Error::InvalidDataRead(io),
        ValueReadError::TypeMismatch(marker) => Error::TypeMismatch(marker),
    })
}

/// The value ran past the end of the buffered bytes.
fn is_truncated(err: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error;

    match err {
        Error::InvalidMarkerRead(io) | Error::InvalidDataRead(io) => {
            io.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

/// What one pull consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// A complete value, nested contents included.
    Value,
    /// Only an array marker and its length.
    ArrayHeader,
}

/// Layout of the bytes that follow a marker.
enum Shape {
    /// `n` payload bytes.
    Fixed(u64),
    /// A big-endian length of `width` bytes, then that many bytes plus `extra`.
    Sized { width: usize, extra: u64 },
    /// `n` nested values.
    Nested(u64),
    /// A big-endian count of `width` bytes, `per` nested values each.
    Counted { width: usize, per: u64 },
}

fn shape(marker: Marker) -> Option<Shape> {
    use Marker::*;

    Some(match marker {
        FixPos(_) | FixNeg(_) | Null | True | False => Shape::Fixed(0),
        U8 | I8 => Shape::Fixed(1),
        U16 | I16 => Shape::Fixed(2),
        U32 | I32 | F32 => Shape::Fixed(4),
        U64 | I64 | F64 => Shape::Fixed(8),
        FixStr(n) => Shape::Fixed(u64::from(n)),
        Str8 | Bin8 => Shape::Sized { width: 1, extra: 0 },
        Str16 | Bin16 => Shape::Sized { width: 2, extra: 0 },
        Str32 | Bin32 => Shape::Sized { width: 4, extra: 0 },
        FixExt1 => Shape::Fixed(2),
        FixExt2 => Shape::Fixed(3),
        FixExt4 => Shape::Fixed(5),
        FixExt8 => Shape::Fixed(9),
        FixExt16 => Shape::Fixed(17),
        Ext8 => Shape::Sized { width: 1, extra: 1 },
        Ext16 => Shape::Sized { width: 2, extra: 1 },
        Ext32 => Shape::Sized { width: 4, extra: 1 },
        FixArray(n) => Shape::Nested(u64::from(n)),
        Array16 => Shape::Counted { width: 2, per: 1 },
        Array32 => Shape::Counted { width: 4, per: 1 },
        FixMap(n) => Shape::Nested(2 * u64::from(n)),
        Map16 => Shape::Counted { width: 2, per: 2 },
        Map32 => Shape::Counted { width: 4, per: 2 },
        Reserved => return None,
    })
}

fn read_be(buf: &[u8], at: usize, width: usize) -> Option<u64> {
    let bytes = buf.get(at..at.checked_add(width)?)?;
    Some(bytes.iter().fold(0u64, |acc, &b| acc << 8 | u64::from(b)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// The value ends at `Scan::end`.
    Complete,
    /// More bytes are needed.
    Incomplete,
    /// A reserved marker; the deserializer reports it.
    Malformed,
}

/// Resumable size scan of the value at the front of the buffer.
///
/// Walks markers and length fields only, picking up where the previous
/// call stopped, so a value that arrives over many reads is deserialized
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scan {
    /// Bytes accounted for so far; may run past the buffered bytes.
    end: usize,
    /// Values whose marker has not been reached yet.
    pending: u64,
}

impl Scan {
    fn new() -> Self {
        Self { end: 0, pending: 1 }
    }

    fn advance(&mut self, buf: &[u8]) -> ScanState {
        while self.pending > 0 {
            let Some(&byte) = buf.get(self.end) else {
                return ScanState::Incomplete;
            };
            let Some(shape) = shape(Marker::from_u8(byte)) else {
                return ScanState::Malformed;
            };

            let head = self.end + 1;
            let (width, body, nested) = match shape {
                Shape::Fixed(n) => (0, n, 0),
                Shape::Nested(n) => (0, 0, n),
                Shape::Sized { width, extra } => match read_be(buf, head, width) {
                    Some(len) => (width, len + extra, 0),
                    None => return ScanState::Incomplete,
                },
                Shape::Counted { width, per } => match read_be(buf, head, width) {
                    Some(count) => (width, 0, count * per),
                    None => return ScanState::Incomplete,
                },
            };

            self.pending = (self.pending - 1).saturating_add(nested);
            self.end = head
                .saturating_add(width)
                .saturating_add(usize::try_from(body).unwrap_or(usize::MAX));
        }

        if self.end <= buf.len() {
            ScanState::Complete
        } else {
            ScanState::Incomplete
        }
    }
}

/// Bytes received from the source but not yet consumed as values.
#[derive(Debug)]
struct ValueBuffer {
    buffer: BytesMut,
    /// Absolute offset of `buffer[0]`.
    offset: u64,
    /// The source has reported end of input.
    eof: bool,
    max_value_size: usize,
    /// Progress on the value at `buffer[0]`.
    scan: Scan,
}

impl ValueBuffer {
    fn new(config: &DecoderConfig) -> Self {
        Self {
            buffer: BytesMut::new(),
            offset: 0,
            eof: false,
            max_value_size: config.max_value_size,
            scan: Scan::new(),
        }
    }

    fn preloaded(bytes: &[u8], config: &DecoderConfig) -> Self {
        Self {
            buffer: BytesMut::from(bytes),
            offset: 0,
            eof: true,
            max_value_size: config.max_value_size,
            scan: Scan::new(),
        }
    }

    /// The front value is incomplete: wait for more bytes unless it is
    /// already known to exceed the limit.
    fn need_more<T>(&mut self) -> Result<Option<T>> {
        if self.scan.end > self.max_value_size || self.buffer.len() >= self.max_value_size {
            self.scan = Scan::new();
            return Err(TyphoonError::ValueTooLarge {
                offset: self.offset,
                max: self.max_value_size,
            });
        }
        Ok(None)
    }

    /// Append a chunk; an empty chunk marks end of input.
    fn extend(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            tracing::debug!("Frame source ended at byte {}", self.offset + self.buffer.len() as u64);
            self.eof = true;
        } else {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Try to take one value from the buffered bytes.
    ///
    /// Returns:
    /// - `Ok(Some(value))` if a complete value was decoded and consumed
    /// - `Ok(None)` if more bytes are needed
    /// - `Err(...)` on exhaustion, corruption or an oversized value
    fn try_take<T, F>(&mut self, framing: Framing, read: &mut F) -> Result<Option<T>>
    where
        F: FnMut(&mut Cursor<&[u8]>) -> RawResult<T>,
    {
        if self.buffer.is_empty() {
            return if self.eof {
                Err(TyphoonError::StreamExhausted)
            } else {
                Ok(None)
            };
        }

        // At end of input the deserializer runs as is; truncation is then
        // corruption.
        if framing == Framing::Value
            && !self.eof
            && self.scan.advance(&self.buffer) == ScanState::Incomplete
        {
            return self.need_more();
        }

        let mut cursor = Cursor::new(&self.buffer[..]);
        match read(&mut cursor) {
            Ok(value) => {
                let used = cursor.position() as usize;
                tracing::trace!("Decoded value at byte {} ({} bytes)", self.offset, used);
                self.buffer.advance(used);
                self.offset += used as u64;
                self.scan = Scan::new();
                Ok(Some(value))
            }
            Err(e) if is_truncated(&e) && !self.eof => self.need_more(),
            Err(source) => {
                self.scan = Scan::new();
                tracing::warn!("Malformed value at byte {}: {}", self.offset, source);
                Err(TyphoonError::Decode {
                    offset: self.offset,
                    source,
                })
            }
        }
    }
}

/// Frame decoder over a blocking [`Read`] source or an in-memory buffer.
#[derive(Debug)]
pub struct FrameDecoder<R> {
    source: R,
    buf: ValueBuffer,
    scratch: Vec<u8>,
}

impl FrameDecoder<io::Empty> {
    /// Decode a complete in-memory frame.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            source: io::empty(),
            buf: ValueBuffer::preloaded(bytes.as_ref(), &DecoderConfig::default()),
            scratch: Vec::new(),
        }
    }
}

impl<R: Read> FrameDecoder<R> {
    /// Decode from a blocking reader with default config.
    pub fn new(source: R) -> Self {
        Self::with_config(source, DecoderConfig::default())
    }

    /// Decode from a blocking reader.
    pub fn with_config(source: R, config: DecoderConfig) -> Self {
        Self {
            source,
            buf: ValueBuffer::new(&config),
            scratch: vec![0u8; config.read_chunk_size.max(1)],
        }
    }

    fn fill(&mut self) -> Result<()> {
        let n = loop {
            match self.source.read(&mut self.scratch) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        self.buf.extend(&self.scratch[..n]);
        Ok(())
    }

    fn pull<T, F>(&mut self, framing: Framing, mut read: F) -> Result<T>
    where
        F: FnMut(&mut Cursor<&[u8]>) -> RawResult<T>,
    {
        loop {
            if let Some(value) = self.buf.try_take(framing, &mut read)? {
                return Ok(value);
            }
            self.fill()?;
        }
    }

    /// Pull the next value as `T`.
    pub fn next<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.pull(Framing::Value, read_value::<T>)
    }

    /// Pull the next value as dynamic data.
    pub fn next_value(&mut self) -> Result<Value> {
        self.next()
    }

    /// Pull and validate a header.
    pub fn next_header(&mut self) -> Result<Header> {
        let header: Header = self.next()?;
        header.validate()?;
        Ok(header)
    }

    /// Pull the next value and decode it from its compact wire form.
    pub fn next_compact(&mut self, schema: &CompactSchema) -> Result<Value> {
        let wire = self.next_value()?;
        Ok(schema.decode(&wire)?)
    }

    /// Pull the next value through `schema` into `T`.
    pub fn next_compact_as<T: DeserializeOwned>(&mut self, schema: &CompactSchema) -> Result<T> {
        let wire = self.next_value()?;
        schema.decode_as(&wire)
    }

    /// Read only an array marker; the elements follow as individual values.
    pub fn next_array_len(&mut self) -> Result<u32> {
        self.pull(Framing::ArrayHeader, read_array_len)
    }

    /// Consume the next value without materializing it.
    pub fn skip(&mut self) -> Result<()> {
        self.pull(Framing::Value, |cursor| {
            IgnoredAny::deserialize(&mut rmp_serde::Deserializer::new(cursor))
        })
        .map(|_| ())
    }

    /// Absolute offset of the next value.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.buf.offset
    }

    /// Bytes read from the source but not yet consumed.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.buffer.len()
    }
}

/// Frame decoder over an async byte source (socket, pipe, duplex).
#[derive(Debug)]
pub struct AsyncFrameDecoder<R> {
    source: R,
    buf: ValueBuffer,
    scratch: Vec<u8>,
}

impl<R: AsyncRead + Unpin> AsyncFrameDecoder<R> {
    /// Decode from an async reader with default config.
    pub fn new(source: R) -> Self {
        Self::with_config(source, DecoderConfig::default())
    }

    /// Decode from an async reader.
    pub fn with_config(source: R, config: DecoderConfig) -> Self {
        Self {
            source,
            buf: ValueBuffer::new(&config),
            scratch: vec![0u8; config.read_chunk_size.max(1)],
        }
    }

    async fn fill(&mut self) -> Result<()> {
        let n = self.source.read(&mut self.scratch).await?;
        self.buf.extend(&self.scratch[..n]);
        Ok(())
    }

    async fn pull<T, F>(&mut self, framing: Framing, mut read: F) -> Result<T>
    where
        F: FnMut(&mut Cursor<&[u8]>) -> RawResult<T>,
    {
        loop {
            if let Some(value) = self.buf.try_take(framing, &mut read)? {
                return Ok(value);
            }
            self.fill().await?;
        }
    }

    /// Pull the next value as `T`, waiting for bytes as needed.
    pub async fn next<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.pull(Framing::Value, read_value::<T>).await
    }

    /// Pull the next value as dynamic data.
    pub async fn next_value(&mut self) -> Result<Value> {
        self.next().await
    }

    /// Pull and validate a header.
    pub async fn next_header(&mut self) -> Result<Header> {
        let header: Header = self.next().await?;
        header.validate()?;
        Ok(header)
    }

    /// Pull the next value and decode it from its compact wire form.
    pub async fn next_compact(&mut self, schema: &CompactSchema) -> Result<Value> {
        let wire = self.next_value().await?;
        Ok(schema.decode(&wire)?)
    }

    /// Pull the next value through `schema` into `T`.
    pub async fn next_compact_as<T: DeserializeOwned>(
        &mut self,
        schema: &CompactSchema,
    ) -> Result<T> {
        let wire = self.next_value().await?;
        schema.decode_as(&wire)
    }

    /// Read only an array marker; the elements follow as individual values.
    pub async fn next_array_len(&mut self) -> Result<u32> {
        self.pull(Framing::ArrayHeader, read_array_len).await
    }

    /// Consume the next value without materializing it.
    pub async fn skip(&mut self) -> Result<()> {
        self.pull(Framing::Value, |cursor| {
            IgnoredAny::deserialize(&mut rmp_serde::Deserializer::new(cursor))
        })
        .await
        .map(|_| ())
    }

    /// Absolute offset of the next value.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.buf.offset
    }

    /// Bytes read from the source but not yet consumed.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.buffer.len()
    }

    /// Give back the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }
}
