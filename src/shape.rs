//! Self-describing value tree exchanged with generated bindings.
//!
//! Generated per-service code hands the client a [`ShapeValue`] for each
//! operation input and receives one back for the output. The tree is what
//! the dialect encoders walk; dotted-path access is what the waiter's
//! matchers resolve against.

use bytes::Bytes;
use std::collections::BTreeMap;

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Bytes),
    List(Vec<ShapeValue>),
    Struct(BTreeMap<String, ShapeValue>),
}

impl ShapeValue {
    /// Build a struct from `(field, value)` pairs.
    pub fn structure<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ShapeValue)>,
        K: Into<String>,
    {
        ShapeValue::Struct(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    pub fn str(value: impl Into<String>) -> Self {
        ShapeValue::Str(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ShapeValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ShapeValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ShapeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ShapeValue]> {
        match self {
            ShapeValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Struct field lookup.
    pub fn get(&self, field: &str) -> Option<&ShapeValue> {
        match self {
            ShapeValue::Struct(fields) => fields.get(field),
            _ => None,
        }
    }

    /// Resolve a dotted path (`"Table.Status"`) through nested structs.
    pub fn path(&self, dotted: &str) -> Option<&ShapeValue> {
        let mut current = self;
        for segment in dotted.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Scalar rendering used for header, query, and path substitution.
    pub fn as_wire_string(&self) -> Option<String> {
        match self {
            ShapeValue::Str(s) => Some(s.clone()),
            ShapeValue::Int(i) => Some(i.to_string()),
            ShapeValue::Float(f) => Some(f.to_string()),
            ShapeValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Convert to a JSON value. Blobs have no JSON form here; raw payloads
    /// travel through the designated payload member instead.
    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        Ok(match self {
            ShapeValue::Null => serde_json::Value::Null,
            ShapeValue::Bool(b) => serde_json::Value::Bool(*b),
            ShapeValue::Int(i) => serde_json::Value::from(*i),
            ShapeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| format!("non-finite float {f}"))?,
            ShapeValue::Str(s) => serde_json::Value::String(s.clone()),
            ShapeValue::Blob(_) => return Err("blob member is not JSON-encodable".to_string()),
            ShapeValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| v.to_json())
                    .collect::<Result<_, _>>()?,
            ),
            ShapeValue::Struct(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /// Build from a JSON value. Integral numbers become `Int`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ShapeValue::Null,
            serde_json::Value::Bool(b) => ShapeValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ShapeValue::Int(i)
                } else {
                    ShapeValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => ShapeValue::Str(s.clone()),
            serde_json::Value::Array(items) => {
                ShapeValue::List(items.iter().map(ShapeValue::from_json).collect())
            }
            serde_json::Value::Object(fields) => ShapeValue::Struct(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), ShapeValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_resolution() {
        let shape = ShapeValue::structure([(
            "Table",
            ShapeValue::structure([("Status", ShapeValue::str("ACTIVE"))]),
        )]);
        assert_eq!(
            shape.path("Table.Status").and_then(ShapeValue::as_str),
            Some("ACTIVE")
        );
        assert!(shape.path("Table.Missing").is_none());
        assert!(shape.path("Missing").is_none());
    }

    #[test]
    fn test_wire_string_rendering() {
        assert_eq!(ShapeValue::str("x y").as_wire_string().unwrap(), "x y");
        assert_eq!(ShapeValue::Int(1).as_wire_string().unwrap(), "1");
        assert_eq!(ShapeValue::Bool(true).as_wire_string().unwrap(), "true");
        assert!(ShapeValue::List(vec![]).as_wire_string().is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let shape = ShapeValue::structure([
            ("A", ShapeValue::str("x")),
            ("B", ShapeValue::Int(7)),
            ("C", ShapeValue::List(vec![ShapeValue::Bool(false)])),
        ]);
        let json = shape.to_json().unwrap();
        assert_eq!(ShapeValue::from_json(&json), shape);
    }

    #[test]
    fn test_blob_refuses_json() {
        let shape = ShapeValue::Blob(Bytes::from_static(b"\x00"));
        assert!(shape.to_json().is_err());
    }
}
