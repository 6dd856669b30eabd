//! Per-handler configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validator::{AcceptAny, ValidationError, Validator};
use crate::protocol::Header;

/// What a handler does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// Pushes a stream of results over time (`client:subscribe`).
    Subscription,
    /// Single request, single response (`client:once`).
    Mutation,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Subscription => f.write_str("subscription"),
            HandlerKind::Mutation => f.write_str("mutation"),
        }
    }
}

/// Name, kind and validators of one handler.
///
/// ```
/// use typhoon::handler::{HandlerConfig, HandlerKind, TypedValidator};
///
/// let config = HandlerConfig::mutation("calc.bot")
///     .request(TypedValidator::<serde_json::Value>::new());
/// assert_eq!(config.kind(), HandlerKind::Mutation);
/// assert!(config.has_request_validator());
/// ```
#[derive(Clone)]
pub struct HandlerConfig {
    name: String,
    kind: HandlerKind,
    request: Option<Arc<dyn Validator>>,
    response: Arc<dyn Validator>,
    response_error: Option<Arc<dyn Validator>>,
}

impl HandlerConfig {
    /// Handler of `kind`; every payload is accepted until validators are set.
    pub fn new(name: impl Into<String>, kind: HandlerKind) -> Self {
        Self {
            name: name.into(),
            kind,
            request: None,
            response: Arc::new(AcceptAny),
            response_error: None,
        }
    }

    /// Subscription handler.
    pub fn subscription(name: impl Into<String>) -> Self {
        Self::new(name, HandlerKind::Subscription)
    }

    /// Mutation handler.
    pub fn mutation(name: impl Into<String>) -> Self {
        Self::new(name, HandlerKind::Mutation)
    }

    /// Validate request payloads with `validator`.
    pub fn request(mut self, validator: impl Validator + 'static) -> Self {
        self.request = Some(Arc::new(validator));
        self
    }

    /// Validate success payloads with `validator`.
    pub fn response(mut self, validator: impl Validator + 'static) -> Self {
        self.response = Arc::new(validator);
        self
    }

    /// Validate error payloads with `validator`.
    pub fn response_error(mut self, validator: impl Validator + 'static) -> Self {
        self.response_error = Some(Arc::new(validator));
        self
    }

    /// Handler name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handler kind.
    #[inline]
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// Check if a request validator is set.
    pub fn has_request_validator(&self) -> bool {
        self.request.is_some()
    }

    /// Validate a request payload. Without a request validator the payload
    /// passes unchanged.
    pub fn validate_request(&self, value: &Value) -> std::result::Result<Value, ValidationError> {
        match &self.request {
            Some(validator) => validator.validate(value),
            None => Ok(value.clone()),
        }
    }

    /// Validate a success payload.
    pub fn validate_response(&self, value: &Value) -> std::result::Result<Value, ValidationError> {
        self.response.validate(value)
    }

    /// Validate an error payload. Without an error validator the payload
    /// passes unchanged.
    pub fn validate_response_error(
        &self,
        value: &Value,
    ) -> std::result::Result<Value, ValidationError> {
        match &self.response_error {
            Some(validator) => validator.validate(value),
            None => Ok(value.clone()),
        }
    }

    /// Validate the payload of a `server:update` frame, choosing the
    /// success or error validator by the header's `success` flag.
    pub fn validate_update(
        &self,
        header: &Header,
        value: &Value,
    ) -> std::result::Result<Value, ValidationError> {
        if header.is_success() {
            self.validate_response(value)
        } else {
            self.validate_response_error(value)
        }
    }
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("request", &self.request.is_some())
            .field("response_error", &self.response_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnValidator;
    use serde_json::json;

    type CheckFn = fn(&Value) -> std::result::Result<Value, ValidationError>;

    fn non_empty() -> FnValidator<CheckFn> {
        fn check(v: &Value) -> std::result::Result<Value, ValidationError> {
            match v.as_str() {
                Some(s) if !s.is_empty() => Ok(v.clone()),
                _ => Err(ValidationError::message("expected a non-empty string")),
            }
        }
        FnValidator::new(check as CheckFn)
    }

    #[test]
    fn test_defaults_pass_through() {
        let config = HandlerConfig::subscription("rooms");
        assert_eq!(config.kind(), HandlerKind::Subscription);
        assert!(!config.has_request_validator());
        assert_eq!(config.validate_request(&json!(1)).unwrap(), json!(1));
        assert_eq!(config.validate_response(&json!([1])).unwrap(), json!([1]));
        assert_eq!(config.validate_response_error(&json!("x")).unwrap(), json!("x"));
    }

    #[test]
    fn test_update_picks_validator_by_success() {
        let config = HandlerConfig::mutation("calc.bot")
            .response(AcceptAny)
            .response_error(non_empty());

        assert!(config
            .validate_update(&Header::update("1", true), &json!(""))
            .is_ok());
        assert!(config
            .validate_update(&Header::update("1", false), &json!(""))
            .is_err());
        assert!(config
            .validate_update(&Header::update("1", false), &json!("rate limited"))
            .is_ok());
    }

    #[test]
    fn test_kind_serde() {
        assert_eq!(serde_json::to_value(HandlerKind::Mutation).unwrap(), json!("mutation"));
        assert_eq!(HandlerKind::Subscription.to_string(), "subscription");
    }

    #[test]
    fn test_debug_hides_validators() {
        let config = HandlerConfig::mutation("calc.bot").request(non_empty());
        let debug = format!("{config:?}");
        assert!(debug.contains("calc.bot"));
        assert!(debug.contains("request: true"));
    }
}
