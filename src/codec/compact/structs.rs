//! Struct transforms: positional tuples and sparse key-order lookups.
//!
//! Both drop field-name strings from the wire. [`StructTuple`] writes every
//! field by position; [`KeyOrderLookup`] writes only the present fields as
//! `[index, value]` pairs, which wins for wide structs that are mostly empty.

use serde_json::{Map, Value};

use super::error::{SchemaError, SchemaPath};
use super::CompactSchema;

/// A named field inside a struct-shaped schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name in the domain (map) form.
    pub name: String,
    /// Transform applied to the field's value.
    pub schema: CompactSchema,
    /// Whether the field may be absent.
    pub optional: bool,
}

impl Field {
    /// Required field with an identity transform.
    pub fn new(name: impl Into<String>) -> Self {
        Self::required(name, CompactSchema::Identity)
    }

    /// Required field.
    pub fn required(name: impl Into<String>, schema: CompactSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            optional: false,
        }
    }

    /// Optional field. Absent and nil are the same thing for optional fields.
    pub fn optional(name: impl Into<String>, schema: CompactSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            optional: true,
        }
    }

    /// The present, non-nil value of this field in `object`, if any.
    fn present<'a>(&self, object: &'a Map<String, Value>) -> Option<&'a Value> {
        match object.get(&self.name) {
            Some(Value::Null) if self.optional => None,
            other => other,
        }
    }

    fn missing(&self) -> SchemaError {
        SchemaError::MissingField {
            path: SchemaPath::root(),
            field: self.name.clone(),
        }
    }
}

fn expect_object(value: &Value) -> Result<&Map<String, Value>, SchemaError> {
    value
        .as_object()
        .ok_or_else(|| SchemaError::unexpected("map", value))
}

fn expect_array(value: &Value) -> Result<&Vec<Value>, SchemaError> {
    value
        .as_array()
        .ok_or_else(|| SchemaError::unexpected("array", value))
}

/// Struct ⇄ positional tuple.
///
/// ```
/// use serde_json::json;
/// use typhoon::codec::compact::{CompactSchema, Field};
///
/// let schema = CompactSchema::tuple(vec![Field::new("healNeeded"), Field::new("considerEnc")]);
/// let wire = schema.encode(&json!({ "healNeeded": 2, "considerEnc": true })).unwrap();
/// assert_eq!(wire, json!([2, true]));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StructTuple {
    fields: Vec<Field>,
}

impl StructTuple {
    /// Create a transform over `fields`, in wire order.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Declared fields in wire order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Struct → tuple. Unknown keys are dropped.
    pub fn encode(&self, value: &Value) -> Result<Value, SchemaError> {
        let object = expect_object(value)?;
        let mut tuple = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            let slot = match field.present(object) {
                Some(v) => field.schema.encode(v).map_err(|e| e.at_field(&field.name))?,
                None if field.optional => Value::Null,
                None => return Err(field.missing()),
            };
            tuple.push(slot);
        }

        Ok(Value::Array(tuple))
    }

    /// Tuple → struct. Nil in an optional position decodes as absent.
    pub fn decode(&self, wire: &Value) -> Result<Value, SchemaError> {
        let tuple = expect_array(wire)?;
        if tuple.len() > self.fields.len() {
            return Err(SchemaError::Arity {
                path: SchemaPath::root(),
                expected: self.fields.len(),
                found: tuple.len(),
            });
        }

        let mut object = Map::new();
        for (i, field) in self.fields.iter().enumerate() {
            match tuple.get(i) {
                Some(Value::Null) | None if field.optional => {}
                None => return Err(field.missing()),
                Some(v) => {
                    let decoded = field.schema.decode(v).map_err(|e| e.at_index(i))?;
                    object.insert(field.name.clone(), decoded);
                }
            }
        }

        Ok(Value::Object(object))
    }
}

/// Struct ⇄ sparse `[index, value]` pairs.
///
/// Absence is always allowed in this form: a field whose index does not
/// appear decodes as absent, whatever its `optional` flag says.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyOrderLookup {
    fields: Vec<Field>,
}

impl KeyOrderLookup {
    /// Create a lookup whose indices are the positions of `fields`.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Declared fields in index order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Struct → pairs, in declared order.
    pub fn encode(&self, value: &Value) -> Result<Value, SchemaError> {
        let object = expect_object(value)?;
        let mut pairs = Vec::new();

        for (i, field) in self.fields.iter().enumerate() {
            let Some(v) = object.get(&field.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let encoded = field.schema.encode(v).map_err(|e| e.at_field(&field.name))?;
            pairs.push(Value::Array(vec![Value::from(i), encoded]));
        }

        Ok(Value::Array(pairs))
    }

    /// Pairs → struct. A later pair for the same index wins.
    pub fn decode(&self, wire: &Value) -> Result<Value, SchemaError> {
        let pairs = expect_array(wire)?;
        let mut object = Map::new();

        for (pos, pair) in pairs.iter().enumerate() {
            let (field, value) = self.lookup(pair).map_err(|e| e.at_index(pos))?;
            let decoded = field
                .schema
                .decode(value)
                .map_err(|e| e.at_index(1).at_index(pos))?;
            object.insert(field.name.clone(), decoded);
        }

        Ok(Value::Object(object))
    }

    fn lookup<'a>(&self, pair: &'a Value) -> Result<(&Field, &'a Value), SchemaError> {
        let [index, value] = pair.as_array().map(Vec::as_slice).unwrap_or_default() else {
            return Err(SchemaError::unexpected("[index, value] pair", pair));
        };

        let Some(raw) = index.as_i64() else {
            return Err(SchemaError::unexpected("integer", index).at_index(0));
        };

        usize::try_from(raw)
            .ok()
            .and_then(|i| self.fields.get(i))
            .map(|field| (field, value))
            .ok_or_else(|| {
                SchemaError::UnknownIndex {
                    path: SchemaPath::root(),
                    index: raw,
                    len: self.fields.len(),
                }
                .at_index(0)
            })
    }
}
