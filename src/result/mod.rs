//! Reactive result model for RPCs and subscriptions.
//!
//! Two independent axes, composed as `RpcResult<Convergence<V>, E>`:
//! - [`RpcResult`] - `Loading` until an outcome arrives, then `Resolved`
//!   with a success or failure value
//! - [`Convergence`] - `Optimistic` (local prediction) or `Complete`
//!   (server-confirmed)
//!
//! [`SubscriptionState`] holds the latest composed value and keeps it from
//! regressing. [`decode_update`] turns a `server:update` frame into an
//! [`RpcResult`].

mod convergence;
mod rpc;

pub use convergence::{Convergence, SubscriptionState};
pub use rpc::{Resolved, RpcResult, Span};

use std::io::Read;

use serde::de::DeserializeOwned;
use tokio::io::AsyncRead;

use crate::error::{Result, TyphoonError};
use crate::protocol::{AsyncFrameDecoder, FrameDecoder, Header};

fn expect_update(header: &Header) -> Result<()> {
    if header.is_update() {
        Ok(())
    } else {
        Err(TyphoonError::Protocol(format!(
            "expected server:update, got {}",
            header.action
        )))
    }
}

/// Read the payload of a `server:update` frame whose header was already
/// pulled from `decoder`.
///
/// `success: false` means the payload is an `E`; otherwise it is a `V`.
///
/// ```
/// use typhoon::protocol::{encode, FrameDecoder, Header};
/// use typhoon::result::decode_update;
///
/// let bytes = encode(&Header::update("abc-123", false), &["rate limited"]).unwrap();
/// let mut decoder = FrameDecoder::from_bytes(bytes);
/// let header = decoder.next_header().unwrap();
///
/// let result = decode_update::<u32, String, _>(&header, &mut decoder).unwrap();
/// assert_eq!(result.into_resolved().unwrap().value, Err("rate limited".to_string()));
/// ```
pub fn decode_update<V, E, R>(
    header: &Header,
    decoder: &mut FrameDecoder<R>,
) -> Result<RpcResult<V, E>>
where
    V: DeserializeOwned,
    E: DeserializeOwned,
    R: Read,
{
    expect_update(header)?;
    let value = if header.is_success() {
        Ok(decoder.next::<V>()?)
    } else {
        Err(decoder.next::<E>()?)
    };
    Ok(RpcResult::Resolved(Resolved::new(value)))
}

/// Async counterpart of [`decode_update`].
pub async fn decode_update_async<V, E, R>(
    header: &Header,
    decoder: &mut AsyncFrameDecoder<R>,
) -> Result<RpcResult<V, E>>
where
    V: DeserializeOwned,
    E: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    expect_update(header)?;
    let value = if header.is_success() {
        Ok(decoder.next::<V>().await?)
    } else {
        Err(decoder.next::<E>().await?)
    };
    Ok(RpcResult::Resolved(Resolved::new(value)))
}
