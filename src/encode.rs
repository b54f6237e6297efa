//! Schema-driven encoding
//!
//! Walks a [`Value`] against the schema it claims to conform to and appends
//! the binary encoding. Any mismatch is an encoding error; nothing is coerced.

use crate::codec::{self, DEFAULT_MAX_DEPTH};
use crate::error::{CodecError, Result};
use crate::schema::{Schema, SchemaEntry};
use crate::value::Value;

/// Append the encoding of `value` under `entry`'s schema
pub fn encode_value(value: &Value, entry: &SchemaEntry, out: &mut Vec<u8>) -> Result<()> {
    encode_value_within(value, entry, DEFAULT_MAX_DEPTH, out)
}

/// Like [`encode_value`], rejecting values nested deeper than `max_depth`
pub fn encode_value_within(value: &Value, entry: &SchemaEntry, max_depth: usize, out: &mut Vec<u8>) -> Result<()> {
    write_value(value, entry.schema(), entry, max_depth, out)
}

/// Encode a value into a fresh buffer
pub fn to_bytes(value: &Value, entry: &SchemaEntry) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_value(value, entry, &mut out)?;
    Ok(out)
}

/// `levels` counts the nesting still allowed below this node
fn write_value(value: &Value, schema: &Schema, entry: &SchemaEntry, levels: usize, out: &mut Vec<u8>) -> Result<()> {
    let Some(levels) = levels.checked_sub(1) else {
        return Err(CodecError::encoding(format!(
            "{} value nests too deep to encode",
            value.kind_name()
        )));
    };
    let schema = entry.resolve(schema)?;
    match (schema, value) {
        (Schema::Null, Value::Null) => {}
        (Schema::Boolean, Value::Boolean(b)) => codec::write_boolean(*b, out),
        (Schema::Int, Value::Int(n)) => codec::write_int(*n, out),
        (Schema::Long, Value::Long(n)) => codec::write_long(*n, out),
        (Schema::Float, Value::Float(f)) => codec::write_float(*f, out),
        (Schema::Double, Value::Double(f)) => codec::write_double(*f, out),
        (Schema::Bytes, Value::Bytes(bytes)) => codec::write_bytes(bytes, out),
        (Schema::String, Value::String(s)) => codec::write_string(s, out),
        (Schema::Fixed(fixed), Value::Fixed(bytes)) => {
            if bytes.len() != fixed.size {
                return Err(CodecError::encoding(format!(
                    "fixed {} holds {} bytes, value has {}",
                    fixed.name,
                    fixed.size,
                    bytes.len()
                )));
            }
            out.extend_from_slice(bytes);
        }
        (Schema::Enum(e), Value::Enum(_, symbol)) => {
            let index = e.index_of(symbol).ok_or_else(|| {
                CodecError::encoding(format!("'{}' is not a symbol of enum {}", symbol, e.name))
            })?;
            codec::write_long(index as i64, out);
        }
        (Schema::Array { items }, Value::Array(list)) => {
            if !list.is_empty() {
                codec::write_long(list.len() as i64, out);
                for item in list {
                    write_value(item, items, entry, levels, out)?;
                }
            }
            codec::write_long(0, out);
        }
        (Schema::Map { values }, Value::Map(map)) => {
            if !map.is_empty() {
                codec::write_long(map.len() as i64, out);
                for (key, item) in map {
                    codec::write_string(key, out);
                    write_value(item, values, entry, levels, out)?;
                }
            }
            codec::write_long(0, out);
        }
        (Schema::Record(record), Value::Record(fields)) => {
            if let Some((unknown, _)) = fields.iter().find(|(name, _)| record.field(name).is_none()) {
                return Err(CodecError::encoding(format!(
                    "record {} has no field '{}'",
                    record.name, unknown
                )));
            }
            for field in &record.fields {
                let item = value.field(&field.name).ok_or_else(|| {
                    CodecError::encoding(format!(
                        "value for record {} is missing field '{}'",
                        record.name, field.name
                    ))
                })?;
                write_value(item, &field.schema, entry, levels, out)?;
            }
        }
        (Schema::Union(union), Value::Union(index, inner)) => {
            let branch = union.variants.get(*index as usize).ok_or_else(|| {
                CodecError::encoding(format!(
                    "union branch {} out of range for {} branches",
                    index,
                    union.variants.len()
                ))
            })?;
            codec::write_long(*index as i64, out);
            write_value(inner, branch, entry, levels, out)?;
        }
        (Schema::Union(union), bare) => {
            let index = union
                .variants
                .iter()
                .position(|branch| conforms_within(bare, branch, entry, levels))
                .ok_or_else(|| {
                    CodecError::encoding(format!("{} value matches no branch of union", bare.kind_name()))
                })?;
            codec::write_long(index as i64, out);
            write_value(bare, &union.variants[index], entry, levels, out)?;
        }
        (schema, value) => {
            return Err(CodecError::encoding(format!(
                "{} value does not conform to {}",
                value.kind_name(),
                schema.describe()
            )));
        }
    }
    Ok(())
}

/// Whether a value can be written under a schema
pub fn conforms(value: &Value, schema: &Schema, entry: &SchemaEntry) -> bool {
    conforms_within(value, schema, entry, DEFAULT_MAX_DEPTH)
}

fn conforms_within(value: &Value, schema: &Schema, entry: &SchemaEntry, levels: usize) -> bool {
    let Some(levels) = levels.checked_sub(1) else {
        return false;
    };
    let Ok(schema) = entry.resolve(schema) else {
        return false;
    };
    match (schema, value) {
        (Schema::Null, Value::Null)
        | (Schema::Boolean, Value::Boolean(_))
        | (Schema::Int, Value::Int(_))
        | (Schema::Long, Value::Long(_))
        | (Schema::Float, Value::Float(_))
        | (Schema::Double, Value::Double(_))
        | (Schema::Bytes, Value::Bytes(_))
        | (Schema::String, Value::String(_)) => true,
        (Schema::Fixed(fixed), Value::Fixed(bytes)) => bytes.len() == fixed.size,
        (Schema::Enum(e), Value::Enum(_, symbol)) => e.index_of(symbol).is_some(),
        (Schema::Array { items }, Value::Array(list)) => list.iter().all(|v| conforms_within(v, items, entry, levels)),
        (Schema::Map { values }, Value::Map(map)) => map.values().all(|v| conforms_within(v, values, entry, levels)),
        (Schema::Record(record), Value::Record(fields)) => {
            fields.len() == record.fields.len()
                && record.fields.iter().all(|field| {
                    value
                        .field(&field.name)
                        .is_some_and(|v| conforms_within(v, &field.schema, entry, levels))
                })
        }
        (Schema::Union(union), Value::Union(index, inner)) => union
            .variants
            .get(*index as usize)
            .is_some_and(|branch| conforms_within(inner, branch, entry, levels)),
        (Schema::Union(union), bare) => union.variants.iter().any(|b| conforms_within(bare, b, entry, levels)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumSchema, FixedSchema, RecordField, RecordSchema};
    use std::collections::BTreeMap;

    fn entry(schema: Schema) -> SchemaEntry {
        SchemaEntry::new(schema).unwrap()
    }

    #[test]
    fn test_record_payload() {
        let schema = entry(
            RecordSchema::new(
                "familiar.message.TestRecord",
                vec![
                    RecordField::new("id", Schema::Long),
                    RecordField::new("name", Schema::String),
                    RecordField::new("tags", Schema::array(Schema::String)),
                ],
            )
            .into(),
        );
        let value = Value::record([
            ("id", Value::Long(42)),
            ("name", Value::from("Bill")),
            ("tags", Value::from(vec!["dog_lover", "cat_hater"])),
        ]);
        let mut expected = vec![0x54, 0x08];
        expected.extend_from_slice(b"Bill");
        expected.extend_from_slice(&[0x04, 0x12]);
        expected.extend_from_slice(b"dog_lover");
        expected.push(0x12);
        expected.extend_from_slice(b"cat_hater");
        expected.push(0x00);
        assert_eq!(to_bytes(&value, &schema).unwrap(), expected);
    }

    #[test]
    fn test_empty_collections_are_single_terminator() {
        let arrays = entry(Schema::array(Schema::Int));
        assert_eq!(to_bytes(&Value::Array(vec![]), &arrays).unwrap(), vec![0]);

        let maps = entry(Schema::map(Schema::Int));
        assert_eq!(to_bytes(&Value::Map(BTreeMap::new()), &maps).unwrap(), vec![0]);
    }

    #[test]
    fn test_map_encoding_is_key_ordered() {
        let maps = entry(Schema::map(Schema::Int));
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), Value::Int(2));
        map.insert("a".to_string(), Value::Int(1));
        assert_eq!(
            to_bytes(&Value::Map(map), &maps).unwrap(),
            vec![0x04, 0x02, b'a', 0x02, 0x02, b'b', 0x04, 0x00]
        );
    }

    #[test]
    fn test_union_branch_selection() {
        let optional = entry(Schema::union(vec![Schema::Null, Schema::String]));
        assert_eq!(to_bytes(&Value::Null, &optional).unwrap(), vec![0x00]);
        assert_eq!(
            to_bytes(&Value::from("x"), &optional).unwrap(),
            vec![0x02, 0x02, b'x']
        );
        assert_eq!(
            to_bytes(&Value::Union(1, Box::new(Value::from("x"))), &optional).unwrap(),
            vec![0x02, 0x02, b'x']
        );
    }

    #[test]
    fn test_union_without_matching_branch() {
        let optional = entry(Schema::union(vec![Schema::Null, Schema::String]));
        let err = to_bytes(&Value::Long(1), &optional).unwrap_err();
        assert!(matches!(err, CodecError::Encoding(_)));

        let err = to_bytes(&Value::Union(5, Box::new(Value::Null)), &optional).unwrap_err();
        assert!(matches!(err, CodecError::Encoding(_)));
    }

    #[test]
    fn test_fixed_length_enforced() {
        let md5 = entry(FixedSchema::new("familiar.Md5", 16).into());
        assert!(to_bytes(&Value::Fixed(vec![0; 16]), &md5).is_ok());
        assert!(matches!(
            to_bytes(&Value::Fixed(vec![0; 15]), &md5),
            Err(CodecError::Encoding(_))
        ));
    }

    #[test]
    fn test_enum_by_symbol() {
        let suit = entry(EnumSchema::new("cards.Suit", &["HEARTS", "SPADES"]).into());
        assert_eq!(to_bytes(&Value::Enum(0, "SPADES".into()), &suit).unwrap(), vec![0x02]);
        assert!(to_bytes(&Value::Enum(0, "CLUBS".into()), &suit).is_err());
    }

    #[test]
    fn test_record_field_mismatches() {
        let point = entry(
            RecordSchema::new(
                "familiar.Point",
                vec![RecordField::new("x", Schema::Int), RecordField::new("y", Schema::Int)],
            )
            .into(),
        );
        let missing = Value::record([("x", Value::Int(1))]);
        assert!(to_bytes(&missing, &point).is_err());

        let extra = Value::record([("x", Value::Int(1)), ("y", Value::Int(2)), ("z", Value::Int(3))]);
        assert!(to_bytes(&extra, &point).is_err());

        let wrong_type = Value::record([("x", Value::Int(1)), ("y", Value::Long(2))]);
        assert!(to_bytes(&wrong_type, &point).is_err());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let schema = entry(Schema::map(Schema::array(Schema::Double)));
        let mut map = BTreeMap::new();
        for key in ["z", "m", "a"] {
            map.insert(key.to_string(), Value::from(vec![1.5f64, -0.0]));
        }
        let value = Value::Map(map);
        assert_eq!(to_bytes(&value, &schema).unwrap(), to_bytes(&value, &schema).unwrap());
    }

    #[test]
    fn test_nesting_bound() {
        let list = entry(
            RecordSchema::new(
                "familiar.LongList",
                vec![
                    RecordField::new("value", Schema::Long),
                    RecordField::new(
                        "next",
                        Schema::union(vec![Schema::Null, Schema::reference("familiar.LongList")]),
                    ),
                ],
            )
            .into(),
        );
        let mut value = Value::record([("value", Value::Long(0)), ("next", Value::Null)]);
        for i in 1..40 {
            value = Value::record([("value", Value::Long(i)), ("next", Value::Union(1, Box::new(value)))]);
        }

        let mut out = Vec::new();
        let err = encode_value_within(&value, &list, 16, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::Encoding(ref msg) if msg.contains("too deep")));
        assert!(encode_value_within(&value, &list, 128, &mut Vec::new()).is_ok());
        assert!(!conforms_within(&value, list.schema(), &list, 16));
        assert!(conforms(&value, list.schema(), &list));
    }
}
