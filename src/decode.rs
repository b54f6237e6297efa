//! Schema-driven decoding
//!
//! Reads a value whose writer schema is also the reader schema, and skips
//! values the reader does not want. Resolved decoding between two different
//! schemas lives in [`crate::resolution`].

use std::collections::BTreeMap;

use crate::codec::Reader;
use crate::error::{CodecError, Result};
use crate::schema::{Name, Schema, SchemaEntry};
use crate::value::Value;

/// Decode one value written under `entry`'s schema
pub fn decode_value(reader: &mut Reader<'_>, entry: &SchemaEntry) -> Result<Value> {
    read_value(reader, entry.schema(), entry)
}

/// Decode a standalone payload, rejecting bytes left over after the value
pub fn from_bytes(bytes: &[u8], entry: &SchemaEntry) -> Result<Value> {
    let mut reader = Reader::new(bytes);
    let value = decode_value(&mut reader, entry)?;
    expect_end(&reader)?;
    Ok(value)
}

pub(crate) fn expect_end(reader: &Reader<'_>) -> Result<()> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(CodecError::malformed(format!(
            "{} trailing bytes after payload at offset {}",
            reader.remaining(),
            reader.position()
        )))
    }
}

pub(crate) fn read_value(r: &mut Reader<'_>, schema: &Schema, entry: &SchemaEntry) -> Result<Value> {
    r.enter()?;
    let value = read_nested(r, schema, entry);
    r.leave();
    value
}

fn read_nested(r: &mut Reader<'_>, schema: &Schema, entry: &SchemaEntry) -> Result<Value> {
    let value = match entry.resolve(schema)? {
        Schema::Null => Value::Null,
        Schema::Boolean => Value::Boolean(r.read_boolean()?),
        Schema::Int => Value::Int(r.read_int()?),
        Schema::Long => Value::Long(r.read_long()?),
        Schema::Float => Value::Float(r.read_float()?),
        Schema::Double => Value::Double(r.read_double()?),
        Schema::Bytes => Value::Bytes(r.read_bytes()?.to_vec()),
        Schema::String => Value::String(r.read_string()?),
        Schema::Fixed(fixed) => Value::Fixed(r.read_exact(fixed.size)?.to_vec()),
        Schema::Enum(e) => {
            let index = read_index(r, e.symbols.len(), "enum symbol")?;
            Value::Enum(index as u32, e.symbols[index].clone())
        }
        Schema::Union(union) => {
            let index = read_index(r, union.variants.len(), "union branch")?;
            Value::Union(index as u32, Box::new(read_value(r, &union.variants[index], entry)?))
        }
        Schema::Array { items } => {
            let mut list = Vec::new();
            read_blocks(r, min_width(items, entry), |r| {
                list.push(read_value(r, items, entry)?);
                Ok(())
            })?;
            Value::Array(list)
        }
        Schema::Map { values } => {
            let mut map = BTreeMap::new();
            read_blocks(r, 1 + min_width(values, entry), |r| {
                let key = r.read_string()?;
                map.insert(key, read_value(r, values, entry)?);
                Ok(())
            })?;
            Value::Map(map)
        }
        Schema::Record(record) => Value::Record(
            record
                .fields
                .iter()
                .map(|field| Ok((field.name.clone(), read_value(r, &field.schema, entry)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        Schema::Ref { name } => {
            return Err(CodecError::invalid(format!("unresolved reference to {}", name)));
        }
    };
    Ok(value)
}

/// Read a `long` index and check it against the number of choices
pub(crate) fn read_index(r: &mut Reader<'_>, len: usize, what: &str) -> Result<usize> {
    let index = r.read_long()?;
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| CodecError::malformed(format!("{} index {} out of range for {}", what, index, len)))
}

/// Fewest bytes any value of `schema` encodes to
pub(crate) fn min_width(schema: &Schema, entry: &SchemaEntry) -> usize {
    min_width_in(schema, entry, &mut Vec::new())
}

fn min_width_in<'s>(schema: &'s Schema, entry: &'s SchemaEntry, open: &mut Vec<&'s Name>) -> usize {
    let Ok(schema) = entry.resolve(schema) else {
        return 0;
    };
    match schema {
        Schema::Null => 0,
        Schema::Float => 4,
        Schema::Double => 8,
        Schema::Fixed(fixed) => fixed.size,
        Schema::Record(record) => {
            // a record reached again through itself adds nothing new
            if open.contains(&&record.name) {
                return 0;
            }
            open.push(&record.name);
            let width = record
                .fields
                .iter()
                .fold(0usize, |sum, field| sum.saturating_add(min_width_in(&field.schema, entry, open)));
            open.pop();
            width
        }
        _ => 1,
    }
}

/// Drive `item` once per element of a block-encoded array or map whose
/// items take at least `item_width` bytes each
pub(crate) fn read_blocks<'a, F>(r: &mut Reader<'a>, item_width: usize, mut item: F) -> Result<()>
where
    F: FnMut(&mut Reader<'a>) -> Result<()>,
{
    loop {
        let count = r.read_long()?;
        if count == 0 {
            return Ok(());
        }
        if count < 0 {
            // block byte size, only needed when skipping
            r.read_len()?;
        }
        r.claim_items(count.unsigned_abs(), item_width)?;
        for _ in 0..count.unsigned_abs() {
            item(r)?;
        }
    }
}

/// Advance past one value written under `schema` without building it
pub(crate) fn skip_value(r: &mut Reader<'_>, schema: &Schema, entry: &SchemaEntry) -> Result<()> {
    r.enter()?;
    let skipped = skip_nested(r, schema, entry);
    r.leave();
    skipped
}

fn skip_nested(r: &mut Reader<'_>, schema: &Schema, entry: &SchemaEntry) -> Result<()> {
    match entry.resolve(schema)? {
        Schema::Null => {}
        Schema::Boolean => r.skip(1)?,
        Schema::Int => {
            r.read_int()?;
        }
        Schema::Long | Schema::Enum(_) => {
            r.read_long()?;
        }
        Schema::Float => r.skip(4)?,
        Schema::Double => r.skip(8)?,
        Schema::Bytes | Schema::String => {
            let len = r.read_len()?;
            r.skip(len)?;
        }
        Schema::Fixed(fixed) => r.skip(fixed.size)?,
        Schema::Union(union) => {
            let index = read_index(r, union.variants.len(), "union branch")?;
            skip_value(r, &union.variants[index], entry)?;
        }
        Schema::Array { items } => skip_blocks(r, min_width(items, entry), |r| skip_value(r, items, entry))?,
        Schema::Map { values } => skip_blocks(r, 1 + min_width(values, entry), |r| {
            let len = r.read_len()?;
            r.skip(len)?;
            skip_value(r, values, entry)
        })?,
        Schema::Record(record) => {
            for field in &record.fields {
                skip_value(r, &field.schema, entry)?;
            }
        }
        Schema::Ref { name } => {
            return Err(CodecError::invalid(format!("unresolved reference to {}", name)));
        }
    }
    Ok(())
}

/// Like [`read_blocks`], but jumps over blocks that carry a byte size
fn skip_blocks<'a, F>(r: &mut Reader<'a>, item_width: usize, mut item: F) -> Result<()>
where
    F: FnMut(&mut Reader<'a>) -> Result<()>,
{
    loop {
        let count = r.read_long()?;
        if count == 0 {
            return Ok(());
        }
        if count < 0 {
            let size = r.read_len()?;
            r.skip(size)?;
            continue;
        }
        r.claim_items(count as u64, item_width)?;
        for _ in 0..count {
            item(r)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{self, Limits};
    use crate::encode::to_bytes;
    use crate::schema::{EnumSchema, RecordField, RecordSchema};

    fn entry(schema: Schema) -> SchemaEntry {
        SchemaEntry::new(schema).unwrap()
    }

    fn linked_list() -> SchemaEntry {
        entry(
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
        )
    }

    #[test]
    fn test_recursive_round_trip() {
        let list = linked_list();
        let tail = Value::record([("value", Value::Long(2)), ("next", Value::Union(0, Box::new(Value::Null)))]);
        let head = Value::record([("value", Value::Long(1)), ("next", Value::Union(1, Box::new(tail)))]);
        let bytes = to_bytes(&head, &list).unwrap();
        assert_eq!(from_bytes(&bytes, &list).unwrap(), head);
    }

    #[test]
    fn test_negative_block_count() {
        let ints = entry(Schema::array(Schema::Int));
        let mut buf = Vec::new();
        codec::write_long(-2, &mut buf);
        codec::write_long(2, &mut buf);
        codec::write_int(3, &mut buf);
        codec::write_int(-3, &mut buf);
        codec::write_long(1, &mut buf);
        codec::write_int(7, &mut buf);
        codec::write_long(0, &mut buf);
        assert_eq!(
            from_bytes(&buf, &ints).unwrap(),
            Value::Array(vec![Value::Int(3), Value::Int(-3), Value::Int(7)])
        );
    }

    #[test]
    fn test_skip_uses_block_size() {
        let strings = entry(Schema::array(Schema::String));
        let mut buf = Vec::new();
        codec::write_long(-1, &mut buf);
        codec::write_long(4, &mut buf);
        codec::write_string("abc", &mut buf);
        codec::write_long(0, &mut buf);
        buf.push(0xAA);

        let mut reader = Reader::new(&buf);
        skip_value(&mut reader, strings.schema(), &strings).unwrap();
        assert_eq!(reader.read_byte().unwrap(), 0xAA);
    }

    #[test]
    fn test_out_of_range_indices() {
        let suit = entry(EnumSchema::new("cards.Suit", &["HEARTS"]).into());
        assert!(matches!(from_bytes(&[0x02], &suit), Err(CodecError::MalformedMessage(_))));
        assert!(from_bytes(&[0x01], &suit).is_err());

        let optional = entry(Schema::union(vec![Schema::Null, Schema::Int]));
        assert!(matches!(from_bytes(&[0x04], &optional), Err(CodecError::MalformedMessage(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let list = linked_list();
        let value = Value::record([("value", Value::Long(300)), ("next", Value::Null)]);
        let bytes = to_bytes(&value, &list).unwrap();
        for len in 0..bytes.len() {
            assert!(matches!(
                from_bytes(&bytes[..len], &list),
                Err(CodecError::MalformedMessage(_))
            ));
        }
    }

    /// `depth` list cells written by hand, so no deep `Value` is built
    fn deep_list_bytes(depth: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        for i in 0..depth {
            codec::write_long(i as i64, &mut buf);
            codec::write_long(if i + 1 < depth { 1 } else { 0 }, &mut buf);
        }
        buf
    }

    fn decode_limited(bytes: &[u8], entry: &SchemaEntry, limits: Limits) -> Result<Value> {
        let mut reader = Reader::with_limits(bytes, limits);
        decode_value(&mut reader, entry)
    }

    #[test]
    fn test_deep_recursive_value_is_rejected() {
        let list = linked_list();
        let limits = Limits {
            max_depth: 64,
            ..Limits::default()
        };
        // each cell nests a record and a union
        assert!(decode_limited(&deep_list_bytes(20), &list, limits).is_ok());
        let err = decode_limited(&deep_list_bytes(200_000), &list, limits).unwrap_err();
        assert!(matches!(err, CodecError::MalformedMessage(ref msg) if msg.contains("deeper than 64")));

        let bytes = deep_list_bytes(200_000);
        let mut reader = Reader::new(&bytes);
        assert!(matches!(
            skip_value(&mut reader, list.schema(), &list),
            Err(CodecError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_zero_width_items_are_bounded() {
        let nulls = entry(Schema::array(Schema::Null));
        let mut buf = Vec::new();
        codec::write_long(20_000_000, &mut buf);
        codec::write_long(0, &mut buf);
        let limits = Limits {
            max_collection_items: 1000,
            ..Limits::default()
        };
        assert!(matches!(decode_limited(&buf, &nulls, limits), Err(CodecError::MalformedMessage(_))));

        let mut small = Vec::new();
        codec::write_long(3, &mut small);
        codec::write_long(0, &mut small);
        assert_eq!(
            decode_limited(&small, &nulls, limits).unwrap(),
            Value::Array(vec![Value::Null; 3])
        );
    }

    #[test]
    fn test_item_budget_spans_nested_collections() {
        let grid = entry(Schema::array(Schema::array(Schema::Null)));
        let mut buf = Vec::new();
        codec::write_long(3, &mut buf);
        for _ in 0..3 {
            codec::write_long(400, &mut buf);
            codec::write_long(0, &mut buf);
        }
        codec::write_long(0, &mut buf);
        let limits = Limits {
            max_collection_items: 1000,
            ..Limits::default()
        };
        assert!(matches!(decode_limited(&buf, &grid, limits), Err(CodecError::MalformedMessage(_))));
        assert!(decode_limited(&buf, &grid, Limits::default()).is_ok());
    }

    #[test]
    fn test_block_count_beyond_input() {
        let longs = entry(Schema::array(Schema::Long));
        let mut buf = Vec::new();
        codec::write_long(1 << 62, &mut buf);
        let err = from_bytes(&buf, &longs).unwrap_err();
        assert!(matches!(err, CodecError::MalformedMessage(ref msg) if msg.contains("cannot fit")));

        let names = entry(Schema::map(Schema::Null));
        let mut buf = Vec::new();
        codec::write_long(5, &mut buf);
        codec::write_string("a", &mut buf);
        assert!(matches!(from_bytes(&buf, &names), Err(CodecError::MalformedMessage(_))));
    }

    #[test]
    fn test_min_width() {
        let list = linked_list();
        assert_eq!(min_width(list.schema(), &list), 2);
        assert_eq!(min_width(&Schema::Null, &list), 0);
        assert_eq!(min_width(&Schema::Double, &list), 8);
        let empty = entry(RecordSchema::new("familiar.Empty", vec![RecordField::new("nothing", Schema::Null)]).into());
        assert_eq!(min_width(empty.schema(), &empty), 0);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let longs = entry(Schema::Long);
        assert!(matches!(from_bytes(&[0x02, 0x00], &longs), Err(CodecError::MalformedMessage(_))));
    }
}
