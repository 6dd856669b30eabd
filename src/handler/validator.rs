//! Payload validators.
//!
//! A [`Validator`] takes a dynamic value and returns either the normalized
//! value or a list of issues, the same contract as a Standard Schema
//! validator on the other side of the wire.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::codec::compact::{CompactSchema, SchemaError};

/// One validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Human-readable description.
    pub message: String,
    /// Location of the offending value, e.g. `$.rooms[2]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Issue {
    /// Issue without a path.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }

    /// Issue at `path`.
    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{path}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// A value failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.issues))]
pub struct ValidationError {
    issues: Vec<Issue>,
}

fn render(issues: &[Issue]) -> String {
    if issues.is_empty() {
        return "invalid value".to_string();
    }
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Error with the given issues.
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    /// Error with a single pathless issue.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(vec![Issue::new(message)])
    }

    /// All issues.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

impl From<SchemaError> for ValidationError {
    fn from(e: SchemaError) -> Self {
        let path = e.path().to_string();
        let rendered = e.to_string();
        let message = rendered
            .strip_prefix(path.as_str())
            .and_then(|rest| rest.strip_prefix(": "))
            .unwrap_or(&rendered)
            .to_string();
        Self::new(vec![Issue::at(path, message)])
    }
}

/// Check and normalize a dynamic value.
pub trait Validator: Send + Sync {
    /// Return the normalized value, or the issues found.
    fn validate(&self, value: &Value) -> std::result::Result<Value, ValidationError>;
}

/// Wire-form validation: a value is valid if the schema decodes it, and the
/// normalized value is its domain form.
impl Validator for CompactSchema {
    fn validate(&self, value: &Value) -> std::result::Result<Value, ValidationError> {
        Ok(self.decode(value)?)
    }
}

/// Accepts everything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAny;

impl Validator for AcceptAny {
    fn validate(&self, value: &Value) -> std::result::Result<Value, ValidationError> {
        Ok(value.clone())
    }
}

/// Validates by deserializing into `T`; the normalized value is `T`
/// serialized back, so defaults are filled in and unknown fields dropped
/// the way `T`'s serde derive dictates.
pub struct TypedValidator<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> TypedValidator<T> {
    /// Create a validator for `T`.
    pub fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T> Default for TypedValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypedValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedValidator<{}>", std::any::type_name::<T>())
    }
}

impl<T> Validator for TypedValidator<T>
where
    T: Serialize + DeserializeOwned,
{
    fn validate(&self, value: &Value) -> std::result::Result<Value, ValidationError> {
        let typed: T = serde_json::from_value(value.clone())
            .map_err(|e| ValidationError::message(e.to_string()))?;
        serde_json::to_value(&typed).map_err(|e| ValidationError::message(e.to_string()))
    }
}

/// Validator backed by a closure.
pub struct FnValidator<F> {
    f: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&Value) -> std::result::Result<Value, ValidationError> + Send + Sync,
{
    /// Wrap `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value) -> std::result::Result<Value, ValidationError> + Send + Sync,
{
    fn validate(&self, value: &Value) -> std::result::Result<Value, ValidationError> {
        (self.f)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::compact::Field;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Calc {
        heal_needed: u32,
        #[serde(default)]
        consider_enc: bool,
    }

    #[test]
    fn test_typed_validator_normalizes() {
        let validator = TypedValidator::<Calc>::new();
        let normalized = validator
            .validate(&json!({ "healNeeded": 2, "extra": 1 }))
            .unwrap();
        assert_eq!(normalized, json!({ "healNeeded": 2, "considerEnc": false }));

        let err = validator.validate(&json!({ "healNeeded": "two" })).unwrap_err();
        assert_eq!(err.issues().len(), 1);
    }

    #[test]
    fn test_compact_schema_validator() {
        let schema = CompactSchema::tuple(vec![
            Field::new("name"),
            Field::required("role", CompactSchema::literal(["tank", "healer"])),
        ]);

        assert_eq!(
            schema.validate(&json!(["ana", 1])).unwrap(),
            json!({ "name": "ana", "role": "healer" })
        );

        let err = schema.validate(&json!(["ana", 9])).unwrap_err();
        assert_eq!(err.issues()[0].path.as_deref(), Some("$[1]"));
    }

    #[test]
    fn test_fn_validator() {
        let positive = FnValidator::new(|v: &Value| match v.as_i64() {
            Some(n) if n > 0 => Ok(v.clone()),
            _ => Err(ValidationError::message("expected a positive integer")),
        });

        assert!(positive.validate(&json!(3)).is_ok());
        let err = positive.validate(&json!(-1)).unwrap_err();
        assert_eq!(err.to_string(), "expected a positive integer");
    }

    #[test]
    fn test_accept_any() {
        assert_eq!(AcceptAny.validate(&json!(null)).unwrap(), json!(null));
    }

    #[test]
    fn test_error_display() {
        let err = ValidationError::new(vec![
            Issue::at("$.a", "missing"),
            Issue::new("bad shape"),
        ]);
        assert_eq!(err.to_string(), "$.a: missing; bad shape");
        assert_eq!(ValidationError::new(vec![]).to_string(), "invalid value");
    }
}
