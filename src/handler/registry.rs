//! Handler registry: handler name → configuration.
//!
//! The registry is data only. It answers "which handler does this frame
//! address, and how are its payloads validated"; running the handler is the
//! caller's business.
//!
//! # Example
//!
//! ```
//! use typhoon::handler::{HandlerConfig, HandlerRegistry};
//! use typhoon::protocol::Header;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(HandlerConfig::mutation("calc.bot")).unwrap();
//! registry.register(HandlerConfig::subscription("rooms")).unwrap();
//!
//! let config = registry.resolve(&Header::once("abc-123", "calc.bot")).unwrap();
//! assert_eq!(config.name(), "calc.bot");
//!
//! let manifest = registry.manifest();
//! assert_eq!(manifest["rooms"]["kind"], "subscription");
//! ```

use std::collections::HashMap;

use serde_json::{json, Value};

use super::config::HandlerConfig;
use crate::error::{Result, TyphoonError};
use crate::protocol::Header;

/// Registry mapping handler names to their configuration.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HandlerConfig>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler.
    ///
    /// # Errors
    ///
    /// Returns [`TyphoonError::DuplicateHandler`] if the name is taken; the
    /// existing registration is kept.
    pub fn register(&mut self, config: HandlerConfig) -> Result<()> {
        if self.handlers.contains_key(config.name()) {
            return Err(TyphoonError::DuplicateHandler(config.name().to_string()));
        }

        tracing::debug!(handler = config.name(), kind = %config.kind(), "registered handler");
        self.handlers.insert(config.name().to_string(), config);
        Ok(())
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<&HandlerConfig> {
        self.handlers.get(name)
    }

    /// Check if a handler is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Find the handler a frame addresses.
    ///
    /// # Errors
    ///
    /// - [`TyphoonError::Protocol`] if the header names no handler
    /// - [`TyphoonError::HandlerNotFound`] if the name is unknown
    pub fn resolve(&self, header: &Header) -> Result<&HandlerConfig> {
        let name = header.handler.as_deref().ok_or_else(|| {
            TyphoonError::Protocol(format!("{} frame {} names no handler", header.action, header.id))
        })?;

        self.get(name)
            .ok_or_else(|| TyphoonError::HandlerNotFound(name.to_string()))
    }

    /// Resolve the handler a request frame addresses and validate its
    /// payload, returning the normalized value.
    ///
    /// # Errors
    ///
    /// Anything [`resolve`](Self::resolve) returns, or
    /// [`TyphoonError::Validation`] if the request validator rejects `value`.
    pub fn validate_request(&self, header: &Header, value: &Value) -> Result<Value> {
        let config = self.resolve(header)?;
        let normalized = config.validate_request(value).map_err(|e| {
            tracing::debug!(handler = config.name(), id = %header.id, error = %e, "request rejected");
            e
        })?;
        Ok(normalized)
    }

    /// Registered handler names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Describe the registered handlers as JSON: `{name: {kind}}`.
    pub fn manifest(&self) -> serde_json::Value {
        let handlers: serde_json::Map<String, serde_json::Value> = self
            .handlers
            .iter()
            .map(|(name, config)| (name.clone(), json!({ "kind": config.kind() })))
            .collect();

        serde_json::Value::Object(handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerKind;

    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(HandlerConfig::mutation("calc.bot")).unwrap();
        registry.register(HandlerConfig::subscription("rooms")).unwrap();
        registry
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("rooms"));
        assert_eq!(registry.get("calc.bot").unwrap().kind(), HandlerKind::Mutation);
        assert_eq!(registry.names(), vec!["calc.bot", "rooms"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = registry();

        let err = registry
            .register(HandlerConfig::subscription("calc.bot"))
            .unwrap_err();
        assert!(matches!(err, TyphoonError::DuplicateHandler(ref n) if n == "calc.bot"));
        // Original registration kept.
        assert_eq!(registry.get("calc.bot").unwrap().kind(), HandlerKind::Mutation);
    }

    #[test]
    fn test_resolve() {
        let registry = registry();

        let config = registry.resolve(&Header::subscribe("s1", "rooms")).unwrap();
        assert_eq!(config.kind(), HandlerKind::Subscription);

        let err = registry.resolve(&Header::once("1", "nope")).unwrap_err();
        assert!(matches!(err, TyphoonError::HandlerNotFound(ref n) if n == "nope"));

        let err = registry.resolve(&Header::update("1", true)).unwrap_err();
        assert!(matches!(err, TyphoonError::Protocol(_)));
    }

    #[test]
    fn test_validate_request() {
        use crate::handler::TypedValidator;

        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct CalcBot {
            heal_needed: u32,
        }

        let mut registry = HandlerRegistry::new();
        registry
            .register(HandlerConfig::mutation("calc.bot").request(TypedValidator::<CalcBot>::new()))
            .unwrap();
        let header = Header::once("abc-123", "calc.bot");

        let value = registry
            .validate_request(&header, &json!({ "healNeeded": 2, "extra": true }))
            .unwrap();
        assert_eq!(value, json!({ "healNeeded": 2 }));

        let err = registry
            .validate_request(&header, &json!({ "healNeeded": "two" }))
            .unwrap_err();
        match err {
            TyphoonError::Validation(e) => assert_eq!(e.issues().len(), 1),
            other => panic!("expected validation error, got {other:?}"),
        }

        let err = registry
            .validate_request(&Header::once("1", "nope"), &json!({}))
            .unwrap_err();
        assert!(matches!(err, TyphoonError::HandlerNotFound(_)));
    }

    #[test]
    fn test_manifest() {
        let manifest = registry().manifest();
        assert_eq!(
            manifest,
            json!({
                "calc.bot": { "kind": "mutation" },
                "rooms": { "kind": "subscription" },
            })
        );
    }

    #[test]
    fn test_empty_registry() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("anything").is_none());
        assert_eq!(registry.manifest(), json!({}));
    }
}
