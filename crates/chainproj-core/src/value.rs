//! The value model shared by source records, event arguments, and entities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A dynamically typed value read from chain storage or a decoded event.
///
/// Maps use `BTreeMap` so that serialization and iteration order are
/// deterministic, which keeps repeated pipeline runs byte-identical.
///
/// Untagged deserialization tries variants in declaration order, so
/// `Array` must precede `Bytes`: a JSON number array is an `Array`, never
/// a byte buffer. `Bytes` holds in-memory decoded payloads; JSON has no
/// distinct shape for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the map variant, or `None` for any other shape.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the array variant, or `None` for any other shape.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the string variant, or `None` for any other shape.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer variant, or `None` for any other shape.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns `true` for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Builds a map value from an iterator of `(name, value)` pairs.
    pub fn map<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a bytes value from raw data.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(data.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(v: Vec<V>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Content fetched from off-chain stores arrives as JSON; numbers that do
/// not fit `i64` are preserved as their decimal string form rather than
/// lossily truncated.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::String(n.to_string()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Value {
    /// Parse a JSON document into a value.
    pub fn from_json_str(json: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(json).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_builder_orders_keys() {
        let v = Value::map([("b", Value::Int(2)), ("a", Value::Int(1))]);
        let m = v.as_map().unwrap();
        let keys: Vec<_> = m.keys().collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn accessors_reject_wrong_shape() {
        assert!(Value::Int(1).as_str().is_none());
        assert!(Value::String("x".into()).as_int().is_none());
        assert!(Value::Null.is_null());
    }

    #[test]
    fn from_conversions() {
        assert_eq!(Value::from(5i64), Value::Int(5));
        assert_eq!(Value::from("hi"), Value::String("hi".into()));
        assert_eq!(
            Value::from(vec![1i64, 2]),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn json_document_maps_into_value() {
        let v = Value::from_json_str(r#"{"title":"couch","price":5,"tags":["used"]}"#).unwrap();
        let m = v.as_map().unwrap();
        assert_eq!(m.get("title"), Some(&Value::from("couch")));
        assert_eq!(m.get("price"), Some(&Value::Int(5)));
        assert_eq!(
            m.get("tags"),
            Some(&Value::Array(vec![Value::from("used")]))
        );
    }

    #[test]
    fn oversized_json_number_kept_as_string() {
        let v = Value::from_json_str("18446744073709551615").unwrap();
        assert_eq!(v, Value::String("18446744073709551615".into()));
    }

    #[test]
    fn serde_roundtrip_preserves_int_arrays() {
        let v = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn serde_roundtrip_preserves_nested_shapes() {
        let v = Value::map([
            ("args", Value::Array(vec![Value::Int(0), Value::Int(255)])),
            ("creator", Value::from("0xBB")),
            ("active", Value::Bool(true)),
            ("meta", Value::Null),
            ("nested", Value::map([("ids", Value::Array(vec![Value::Int(7)]))])),
        ]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
