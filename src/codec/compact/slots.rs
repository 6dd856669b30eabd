//! Fixed-size sparse slot data.
//!
//! A five-seat room where only two seats are filled goes over the wire as
//! `[seat0, null, seat2]`: a variable-length array of optionals with the
//! trailing empties dropped. Decoding pads it back out to the declared width.

use serde_json::{Map, Value};

use super::error::{SchemaError, SchemaPath};
use super::CompactSchema;

#[derive(Debug, Clone, PartialEq)]
enum Layout {
    /// Decoded as a fixed-width array with nil for empty slots.
    Tuple(Vec<CompactSchema>),
    /// Decoded as a struct with absent fields for empty slots.
    Struct(Vec<(String, CompactSchema)>),
}

/// Option array ⇄ option tuple / option struct.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSlots {
    layout: Layout,
}

impl OptionSlots {
    /// Fixed-width tuple, one schema per slot.
    pub fn tuple(slots: Vec<CompactSchema>) -> Self {
        Self {
            layout: Layout::Tuple(slots),
        }
    }

    /// `width` slots sharing one schema.
    pub fn uniform(width: usize, schema: CompactSchema) -> Self {
        Self::tuple(vec![schema; width])
    }

    /// Named slots, decoded as a struct.
    pub fn named<I, N>(slots: I) -> Self
    where
        I: IntoIterator<Item = (N, CompactSchema)>,
        N: Into<String>,
    {
        Self {
            layout: Layout::Struct(slots.into_iter().map(|(n, s)| (n.into(), s)).collect()),
        }
    }

    /// Number of slots.
    pub fn width(&self) -> usize {
        match &self.layout {
            Layout::Tuple(slots) => slots.len(),
            Layout::Struct(slots) => slots.len(),
        }
    }

    fn schema_at(&self, i: usize) -> &CompactSchema {
        match &self.layout {
            Layout::Tuple(slots) => &slots[i],
            Layout::Struct(slots) => &slots[i].1,
        }
    }

    fn arity(&self, found: usize) -> SchemaError {
        SchemaError::Arity {
            path: SchemaPath::root(),
            expected: self.width(),
            found,
        }
    }

    /// Tuple/struct → trimmed option array.
    pub fn encode(&self, value: &Value) -> Result<Value, SchemaError> {
        let mut slots: Vec<Value> = match (&self.layout, value) {
            (Layout::Tuple(_), Value::Array(items)) => {
                if items.len() > self.width() {
                    return Err(self.arity(items.len()));
                }
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.encode_slot(i, item).map_err(|e| e.at_index(i)))
                    .collect::<Result<_, _>>()?
            }
            (Layout::Struct(names), Value::Object(object)) => names
                .iter()
                .enumerate()
                .map(|(i, (name, _))| {
                    let item = object.get(name).unwrap_or(&Value::Null);
                    self.encode_slot(i, item).map_err(|e| e.at_field(name))
                })
                .collect::<Result<_, _>>()?,
            (Layout::Tuple(_), other) => return Err(SchemaError::unexpected("array", other)),
            (Layout::Struct(_), other) => return Err(SchemaError::unexpected("map", other)),
        };

        while slots.last().is_some_and(Value::is_null) {
            slots.pop();
        }

        Ok(Value::Array(slots))
    }

    fn encode_slot(&self, i: usize, item: &Value) -> Result<Value, SchemaError> {
        if item.is_null() {
            Ok(Value::Null)
        } else {
            self.schema_at(i).encode(item)
        }
    }

    /// Option array → fixed-width tuple/struct. Missing trailing slots are none.
    pub fn decode(&self, wire: &Value) -> Result<Value, SchemaError> {
        let items = wire
            .as_array()
            .ok_or_else(|| SchemaError::unexpected("array", wire))?;
        if items.len() > self.width() {
            return Err(self.arity(items.len()));
        }

        let mut decoded = Vec::with_capacity(self.width());
        for i in 0..self.width() {
            let slot = match items.get(i) {
                None | Some(Value::Null) => Value::Null,
                Some(item) => self.schema_at(i).decode(item).map_err(|e| e.at_index(i))?,
            };
            decoded.push(slot);
        }

        match &self.layout {
            Layout::Tuple(_) => Ok(Value::Array(decoded)),
            Layout::Struct(names) => {
                let object: Map<String, Value> = names
                    .iter()
                    .zip(decoded)
                    .filter(|(_, v)| !v.is_null())
                    .map(|((name, _), v)| (name.clone(), v))
                    .collect();
                Ok(Value::Object(object))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_of_five() {
        let room = OptionSlots::uniform(5, CompactSchema::Identity);

        let decoded = room.decode(&json!(["ana", null, "kai"])).unwrap();
        assert_eq!(decoded, json!(["ana", null, "kai", null, null]));

        let wire = room.encode(&decoded).unwrap();
        assert_eq!(wire, json!(["ana", null, "kai"]));
    }

    #[test]
    fn test_empty_room() {
        let room = OptionSlots::uniform(3, CompactSchema::Identity);
        assert_eq!(room.decode(&json!([])).unwrap(), json!([null, null, null]));
        assert_eq!(room.encode(&json!([null, null, null])).unwrap(), json!([]));
    }

    #[test]
    fn test_too_many_slots() {
        let room = OptionSlots::uniform(2, CompactSchema::Identity);
        assert!(matches!(
            room.decode(&json!([1, 2, 3])),
            Err(SchemaError::Arity { expected: 2, found: 3, .. })
        ));
        assert!(room.encode(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_named_slots() {
        let slots = OptionSlots::named([
            ("first", CompactSchema::Identity),
            ("second", CompactSchema::Identity),
            ("third", CompactSchema::Identity),
        ]);

        let decoded = slots.decode(&json!([null, 4])).unwrap();
        assert_eq!(decoded, json!({ "second": 4 }));
        assert_eq!(slots.encode(&decoded).unwrap(), json!([null, 4]));
    }

    #[test]
    fn test_slot_schema_errors_carry_position() {
        let slots = OptionSlots::uniform(
            3,
            CompactSchema::literal(["tank", "healer"]),
        );
        let err = slots.decode(&json!([0, null, 5])).unwrap_err();
        assert_eq!(err.path().to_string(), "$[2]");
        assert_eq!(err.unknown_index(), Some(5));
    }
}
