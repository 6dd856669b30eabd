//! Handler module - handler metadata and payload validation.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps handler names to [`HandlerConfig`]
//! - [`HandlerConfig`] - kind plus request/response validators
//! - [`Validator`] - the validation contract, with [`TypedValidator`],
//!   [`FnValidator`], [`AcceptAny`] and compact schemas as implementations
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//! use typhoon::handler::{HandlerConfig, HandlerRegistry, TypedValidator};
//!
//! #[derive(Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct CalcRequest {
//!     heal_needed: u32,
//!     consider_enc: bool,
//! }
//!
//! let mut registry = HandlerRegistry::new();
//! registry
//!     .register(HandlerConfig::mutation("calc.bot").request(TypedValidator::<CalcRequest>::new()))
//!     .unwrap();
//!
//! let config = registry.get("calc.bot").unwrap();
//! assert!(config.validate_request(&json!({ "healNeeded": 2, "considerEnc": true })).is_ok());
//! assert!(config.validate_request(&json!({ "healNeeded": "two" })).is_err());
//! ```

mod config;
mod registry;
mod validator;

pub use config::{HandlerConfig, HandlerKind};
pub use registry::HandlerRegistry;
pub use validator::{AcceptAny, FnValidator, Issue, TypedValidator, ValidationError, Validator};
