//! Generic values
//!
//! [`Value`] is the datum shape produced by decoding and consumed by encoding.
//! Maps are ordered by key so that encoding a value is deterministic.

use std::collections::BTreeMap;

use crate::error::{CodecError, Result};
use crate::schema::{Schema, SchemaEntry};

/// A decoded or to-be-encoded datum
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Fixed(Vec<u8>),
    /// Symbol index and symbol
    Enum(u32, String),
    /// Branch index and branch value
    Union(u32, Box<Value>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Fields in schema order
    Record(Vec<(String, Value)>),
}

impl Value {
    /// Build a record value from field name/value pairs
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a record field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Strip a union wrapper, if any
    pub fn unwrap_union(&self) -> &Value {
        match self {
            Value::Union(_, inner) => inner,
            other => other,
        }
    }

    /// Short label for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
            Value::Fixed(_) => "fixed",
            Value::Enum(..) => "enum",
            Value::Union(..) => "union",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
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

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Default Literals
// =============================================================================

/// Convert a field's JSON default literal into a value of the field's type.
///
/// Bytes and fixed defaults are strings whose code points 0-255 are the byte
/// values. A union default always belongs to the first branch.
pub(crate) fn default_value(literal: &serde_json::Value, schema: &Schema, entry: &SchemaEntry) -> Result<Value> {
    use serde_json::Value as Json;

    let mismatch = || {
        CodecError::incompatible(format!(
            "default {} does not match type {}",
            literal,
            schema.describe()
        ))
    };

    let schema = entry.resolve(schema)?;
    match (schema, literal) {
        (Schema::Null, Json::Null) => Ok(Value::Null),
        (Schema::Boolean, Json::Bool(b)) => Ok(Value::Boolean(*b)),
        (Schema::Int, Json::Number(n)) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::Int)
            .ok_or_else(mismatch),
        (Schema::Long, Json::Number(n)) => n.as_i64().map(Value::Long).ok_or_else(mismatch),
        (Schema::Float, Json::Number(n)) => n.as_f64().map(|f| Value::Float(f as f32)).ok_or_else(mismatch),
        (Schema::Double, Json::Number(n)) => n.as_f64().map(Value::Double).ok_or_else(mismatch),
        (Schema::Bytes, Json::String(s)) => latin1_bytes(s).map(Value::Bytes).ok_or_else(mismatch),
        (Schema::Fixed(fixed), Json::String(s)) => match latin1_bytes(s) {
            Some(bytes) if bytes.len() == fixed.size => Ok(Value::Fixed(bytes)),
            _ => Err(mismatch()),
        },
        (Schema::String, Json::String(s)) => Ok(Value::String(s.clone())),
        (Schema::Enum(e), Json::String(s)) => e
            .index_of(s)
            .map(|i| Value::Enum(i as u32, s.clone()))
            .ok_or_else(mismatch),
        (Schema::Array { items }, Json::Array(list)) => list
            .iter()
            .map(|item| default_value(item, items, entry))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        (Schema::Map { values }, Json::Object(object)) => object
            .iter()
            .map(|(k, v)| Ok((k.clone(), default_value(v, values, entry)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Map),
        (Schema::Record(record), Json::Object(object)) => {
            let mut fields = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let literal = object
                    .get(&field.name)
                    .or(field.default.as_ref())
                    .ok_or_else(|| {
                        CodecError::incompatible(format!(
                            "default for record {} has no value for field '{}'",
                            record.name, field.name
                        ))
                    })?;
                fields.push((field.name.clone(), default_value(literal, &field.schema, entry)?));
            }
            Ok(Value::Record(fields))
        }
        (Schema::Union(union), _) => {
            let first = union.variants.first().ok_or_else(mismatch)?;
            Ok(Value::Union(0, Box::new(default_value(literal, first, entry)?)))
        }
        _ => Err(mismatch()),
    }
}

fn latin1_bytes(s: &str) -> Option<Vec<u8>> {
    s.chars().map(|c| u8::try_from(c as u32).ok()).collect()
}
