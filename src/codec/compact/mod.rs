//! Compact schema transforms for shrinking payloads.
//!
//! Payloads are JSON-like documents. A [`CompactSchema`] maps the readable
//! domain form to a smaller wire form and back:
//!
//! | Schema | Domain | Wire |
//! |--------|--------|------|
//! | [`StructTuple`] | `{a: 1, b: 2}` | `[1, 2]` |
//! | [`LiteralIndex`] | `"healer"` | `1` |
//! | [`KeyOrderLookup`] | `{a: 5, b: "x"}` | `[[0, 5], [1, "x"]]` |
//! | [`OptionSlots`] | `[x, null, y, null, null]` | `[x, null, y]` |
//!
//! Every transform is symmetric: `decode(encode(v)) == v` for any
//! well-formed `v`. Failures are [`SchemaError`]s carrying the path of the
//! offending value.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use typhoon::codec::compact::{CompactSchema, Field};
//!
//! let member = CompactSchema::tuple(vec![
//!     Field::new("name"),
//!     Field::required("role", CompactSchema::literal(["tank", "healer", "dps"])),
//! ]);
//! let room = CompactSchema::slots(5, member);
//!
//! let domain = json!([{ "name": "ana", "role": "healer" }, null, null, null, null]);
//! let wire = room.encode(&domain).unwrap();
//! assert_eq!(wire, json!([["ana", 1]]));
//! assert_eq!(room.decode(&wire).unwrap(), domain);
//! ```

mod error;
mod literal;
mod slots;
mod structs;

pub use error::{SchemaError, SchemaPath, Segment};
pub use literal::LiteralIndex;
pub use slots::OptionSlots;
pub use structs::{Field, KeyOrderLookup, StructTuple};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// A composable compact transform.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CompactSchema {
    /// Value passes through unchanged.
    #[default]
    Identity,
    /// Struct ⇄ positional tuple.
    Tuple(StructTuple),
    /// Literal ⇄ index.
    Literal(LiteralIndex),
    /// Struct ⇄ sparse `[index, value]` pairs.
    Lookup(KeyOrderLookup),
    /// Option array ⇄ fixed-width tuple or struct.
    Slots(OptionSlots),
    /// Every element of an array through the inner schema.
    Array(Box<CompactSchema>),
    /// Nil passes through; anything else goes through the inner schema.
    Nullable(Box<CompactSchema>),
}

impl CompactSchema {
    /// Struct ⇄ tuple over `fields`.
    pub fn tuple(fields: Vec<Field>) -> Self {
        CompactSchema::Tuple(StructTuple::new(fields))
    }

    /// Literal ⇄ index over `literals`.
    pub fn literal<I, V>(literals: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        CompactSchema::Literal(LiteralIndex::new(literals))
    }

    /// Sparse lookup over `fields`.
    pub fn lookup(fields: Vec<Field>) -> Self {
        CompactSchema::Lookup(KeyOrderLookup::new(fields))
    }

    /// `width` uniform option slots.
    pub fn slots(width: usize, schema: CompactSchema) -> Self {
        CompactSchema::Slots(OptionSlots::uniform(width, schema))
    }

    /// Array of `schema`.
    pub fn array(schema: CompactSchema) -> Self {
        CompactSchema::Array(Box::new(schema))
    }

    /// Nullable `schema`.
    pub fn nullable(schema: CompactSchema) -> Self {
        CompactSchema::Nullable(Box::new(schema))
    }

    /// Domain → wire.
    pub fn encode(&self, value: &Value) -> std::result::Result<Value, SchemaError> {
        match self {
            CompactSchema::Identity => Ok(value.clone()),
            CompactSchema::Tuple(s) => s.encode(value),
            CompactSchema::Literal(s) => s.encode(value),
            CompactSchema::Lookup(s) => s.encode(value),
            CompactSchema::Slots(s) => s.encode(value),
            CompactSchema::Array(inner) => map_elements(value, |v| inner.encode(v)),
            CompactSchema::Nullable(_) if value.is_null() => Ok(Value::Null),
            CompactSchema::Nullable(inner) => inner.encode(value),
        }
    }

    /// Wire → domain.
    pub fn decode(&self, wire: &Value) -> std::result::Result<Value, SchemaError> {
        match self {
            CompactSchema::Identity => Ok(wire.clone()),
            CompactSchema::Tuple(s) => s.decode(wire),
            CompactSchema::Literal(s) => s.decode(wire),
            CompactSchema::Lookup(s) => s.decode(wire),
            CompactSchema::Slots(s) => s.decode(wire),
            CompactSchema::Array(inner) => map_elements(wire, |v| inner.decode(v)),
            CompactSchema::Nullable(_) if wire.is_null() => Ok(Value::Null),
            CompactSchema::Nullable(inner) => inner.decode(wire),
        }
    }

    /// Serialize `value` to its domain form, then encode.
    pub fn encode_from<T: Serialize + ?Sized>(&self, value: &T) -> Result<Value> {
        let domain = serde_json::to_value(value)?;
        Ok(self.encode(&domain)?)
    }

    /// Decode, then deserialize the domain form into `T`.
    pub fn decode_as<T: DeserializeOwned>(&self, wire: &Value) -> Result<T> {
        let domain = self.decode(wire)?;
        Ok(serde_json::from_value(domain)?)
    }
}

fn map_elements<F>(value: &Value, mut f: F) -> std::result::Result<Value, SchemaError>
where
    F: FnMut(&Value) -> std::result::Result<Value, SchemaError>,
{
    let items = value
        .as_array()
        .ok_or_else(|| SchemaError::unexpected("array", value))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| f(item).map_err(|e| e.at_index(i)))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Value::Array)
}
