//! Structured errors for compact schema transforms.
//!
//! Every error carries the path to the offending value, rendered as
//! `$.rooms[2].role`, so a transport layer can turn it into a precise
//! protocol error response.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// One step in a [`SchemaPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Named struct field.
    Field(String),
    /// Array/tuple position.
    Index(usize),
}

/// Location of a value inside the document being transformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaPath(Vec<Segment>);

impl SchemaPath {
    /// The document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Path segments from the root outwards.
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}

/// Compact schema failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// A positional or lookup index is outside the declared schema.
    #[error("{path}: index {index} is outside the declared schema ({len} entries)")]
    UnknownIndex {
        /// Location of the index.
        path: SchemaPath,
        /// The offending index, as it appeared on the wire.
        index: i64,
        /// Number of declared entries.
        len: usize,
    },

    /// A value is not one of the declared literals.
    #[error("{path}: {value} is not a declared literal")]
    UnknownLiteral {
        /// Location of the value.
        path: SchemaPath,
        /// The offending value.
        value: Value,
    },

    /// A required struct field is missing.
    #[error("{path}: missing required field `{field}`")]
    MissingField {
        /// Location of the struct.
        path: SchemaPath,
        /// Name of the missing field.
        field: String,
    },

    /// Wrong number of positional elements.
    #[error("{path}: expected at most {expected} elements, found {found}")]
    Arity {
        /// Location of the array.
        path: SchemaPath,
        /// Declared width.
        expected: usize,
        /// Actual length.
        found: usize,
    },

    /// Wrong JSON kind.
    #[error("{path}: expected {expected}, found {found}")]
    Unexpected {
        /// Location of the value.
        path: SchemaPath,
        /// Kind the schema requires.
        expected: &'static str,
        /// Kind that was present.
        found: &'static str,
    },
}

impl SchemaError {
    pub(crate) fn unexpected(expected: &'static str, found: &Value) -> Self {
        SchemaError::Unexpected {
            path: SchemaPath::root(),
            expected,
            found: kind_of(found),
        }
    }

    /// The path of the offending value.
    pub fn path(&self) -> &SchemaPath {
        match self {
            SchemaError::UnknownIndex { path, .. }
            | SchemaError::UnknownLiteral { path, .. }
            | SchemaError::MissingField { path, .. }
            | SchemaError::Arity { path, .. }
            | SchemaError::Unexpected { path, .. } => path,
        }
    }

    /// The offending index for [`SchemaError::UnknownIndex`].
    pub fn unknown_index(&self) -> Option<i64> {
        match self {
            SchemaError::UnknownIndex { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Prefix the path with `segment` while unwinding out of a nested value.
    pub(crate) fn at(mut self, segment: Segment) -> Self {
        let path = match &mut self {
            SchemaError::UnknownIndex { path, .. }
            | SchemaError::UnknownLiteral { path, .. }
            | SchemaError::MissingField { path, .. }
            | SchemaError::Arity { path, .. }
            | SchemaError::Unexpected { path, .. } => path,
        };
        path.0.insert(0, segment);
        self
    }

    pub(crate) fn at_field(self, name: &str) -> Self {
        self.at(Segment::Field(name.to_string()))
    }

    pub(crate) fn at_index(self, index: usize) -> Self {
        self.at(Segment::Index(index))
    }
}

/// Short name of a JSON value's kind, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_display() {
        let err = SchemaError::unexpected("map", &Value::Bool(true))
            .at_field("role")
            .at_index(2)
            .at_field("rooms");

        assert_eq!(err.path().to_string(), "$.rooms[2].role");
        assert_eq!(err.to_string(), "$.rooms[2].role: expected map, found bool");
    }

    #[test]
    fn test_unknown_index_accessor() {
        let err = SchemaError::UnknownIndex {
            path: SchemaPath::root(),
            index: 9,
            len: 3,
        };
        assert_eq!(err.unknown_index(), Some(9));
        assert!(err.to_string().contains("index 9"));
    }
}
