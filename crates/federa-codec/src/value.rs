use bytes::Bytes;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};

use crate::object_id::ObjectId;

/// An insertion-ordered map of named values.
pub type ValueMap = IndexMap<String, Value>;

/// A structured value carried by the wire format.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Bytes),
    /// Reference to a replicated object.
    Object(ObjectId),
    Array(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    /// An empty map value.
    pub fn map() -> Self {
        Value::Map(ValueMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value of an `Int` or `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key if this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Visit every object reference held by this value, depth first.
    pub fn for_each_object(&self, f: &mut impl FnMut(ObjectId)) {
        match self {
            Value::Object(id) => f(*id),
            Value::Array(items) => {
                for item in items {
                    item.for_each_object(&mut *f);
                }
            }
            Value::Map(map) => {
                for item in map.values() {
                    item.for_each_object(&mut *f);
                }
            }
            _ => {}
        }
    }

    /// Returns true if any object reference held by this value matches.
    pub fn any_object(&self, f: &mut impl FnMut(ObjectId) -> bool) -> bool {
        match self {
            Value::Object(id) => f(*id),
            Value::Array(items) => items.iter().any(|v| v.any_object(&mut *f)),
            Value::Map(map) => map.values().any(|v| v.any_object(&mut *f)),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(b))
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Object references serialize as `{"$id": "<hex>"}`, binary as a hex string.
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                serializer.serialize_str(&hex)
            }
            Value::Object(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$id", id)?;
                map.end()
            }
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_into_map_preserves_order() {
        let value: Value = [("b", Value::from(1)), ("a", Value::from(2))]
            .into_iter()
            .collect();
        let keys: Vec<_> = value.as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn for_each_object_walks_nested_values() {
        let a = ObjectId::from_bytes([1; 12]);
        let b = ObjectId::from_bytes([2; 12]);
        let value: Value = [
            ("x", Value::from(a)),
            ("y", Value::Array(vec![Value::Null, [("z", b)].into_iter().collect()])),
        ]
        .into_iter()
        .collect();

        let mut seen = Vec::new();
        value.for_each_object(&mut |id| seen.push(id));
        assert_eq!(seen, vec![a, b]);
        assert!(value.any_object(&mut |id| id == b));
        assert!(!Value::from("x").any_object(&mut |_| true));
    }

    #[test]
    fn serializes_as_json() {
        let id: ObjectId = "111122223333444455556666".parse().unwrap();
        let value: Value = [
            ("id", Value::from(id)),
            ("bin", Value::from(vec![0x41u8, 0x42])),
            ("n", Value::from(3)),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(
            json,
            r#"{"id":{"$id":"111122223333444455556666"},"bin":"4142","n":3}"#
        );
    }
}
