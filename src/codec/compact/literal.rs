//! Closed enums as a single integer on the wire.

use serde_json::Value;

use super::error::{SchemaError, SchemaPath};

/// Literal ⇄ index.
///
/// The wire form of a literal is its position in the declared list, so the
/// list order is part of the protocol: append new literals, never reorder.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralIndex {
    literals: Vec<Value>,
}

impl LiteralIndex {
    /// Create a transform over `literals`.
    pub fn new<I, V>(literals: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            literals: literals.into_iter().map(Into::into).collect(),
        }
    }

    /// Declared literals in index order.
    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    /// Literal → index.
    pub fn encode(&self, value: &Value) -> Result<Value, SchemaError> {
        self.literals
            .iter()
            .position(|literal| literal == value)
            .map(Value::from)
            .ok_or_else(|| SchemaError::UnknownLiteral {
                path: SchemaPath::root(),
                value: value.clone(),
            })
    }

    /// Index → literal.
    pub fn decode(&self, wire: &Value) -> Result<Value, SchemaError> {
        let raw = wire
            .as_i64()
            .ok_or_else(|| SchemaError::unexpected("integer", wire))?;

        usize::try_from(raw)
            .ok()
            .and_then(|i| self.literals.get(i))
            .cloned()
            .ok_or(SchemaError::UnknownIndex {
                path: SchemaPath::root(),
                index: raw,
                len: self.literals.len(),
            })
    }
}
