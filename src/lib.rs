//! # typhoon
//!
//! Runtime pieces of the Typhoon RPC/subscription protocol.
//!
//! A frame is a stream of concatenated MessagePack values: a [`Header`]
//! followed by zero or more payload values. There is no outer length
//! prefix, so values are pulled one at a time as bytes arrive.
//!
//! ## Modules
//!
//! - [`protocol`] - header, frame encoding and the pull decoder
//! - [`codec`] - MessagePack helpers and compact schema transforms
//! - [`cache`] - single-flight, reference-counted resource cache
//! - [`lifecycle`] - start/stop controller for one long-running task
//! - [`result`] - loading/resolved and optimistic/complete result model
//! - [`handler`] - handler registry and payload validation
//!
//! ## Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use typhoon::protocol::{encode, FrameDecoder, Header};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct CalcBot {
//!     heal_needed: u32,
//!     consider_enc: bool,
//! }
//!
//! let request = CalcBot { heal_needed: 2, consider_enc: true };
//! let bytes = encode(&Header::once("abc-123", "calc.bot"), &[&request]).unwrap();
//!
//! let mut decoder = FrameDecoder::from_bytes(bytes);
//! let header = decoder.next_header().unwrap();
//! assert_eq!(header.handler.as_deref(), Some("calc.bot"));
//! assert_eq!(decoder.next::<CalcBot>().unwrap(), request);
//! assert!(decoder.next_value().unwrap_err().is_exhausted());
//! ```
//!
//! [`Header`]: protocol::Header

use std::future::Future;
use std::pin::Pin;

pub mod cache;
pub mod codec;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod protocol;
pub mod result;

pub use cache::{CacheRef, SingleFlightCache};
pub use error::{Result, TyphoonError};
pub use handler::{HandlerConfig, HandlerKind, HandlerRegistry};
pub use lifecycle::{LifecycleController, RunOutcome, RunStatus};
pub use protocol::{Action, Frame, FrameDecoder, Header};
pub use result::{Convergence, RpcResult, SubscriptionState};

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
