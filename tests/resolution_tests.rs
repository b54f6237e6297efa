//! End-to-end schema resolution through framed messages

use std::sync::Arc;

use familiar_codec::{
    CodecError, EnumSchema, ErrorKind, Fingerprint, FixedSchema, MemorySchemaStore, MessageDecoder, MessageEncoder,
    RecordField, RecordSchema, Schema, SchemaEntry, SchemaStore, Value,
};
use serde_json::json;

fn user_v1() -> SchemaEntry {
    SchemaEntry::new(
        RecordSchema::new(
            "familiar.message.User",
            vec![RecordField::new("id", Schema::Long), RecordField::new("name", Schema::String)],
        )
        .into(),
    )
    .unwrap()
}

fn user_v2() -> SchemaEntry {
    SchemaEntry::new(
        RecordSchema::new(
            "familiar.message.User",
            vec![
                RecordField::new("id", Schema::Long),
                RecordField::new("name", Schema::String),
                RecordField::new("tags", Schema::array(Schema::String)).with_default(json!([])),
            ],
        )
        .into(),
    )
    .unwrap()
}

fn decoder_with(reader: SchemaEntry, writers: &[SchemaEntry]) -> MessageDecoder {
    let store = Arc::new(MemorySchemaStore::new());
    for writer in writers {
        store.add(writer.clone()).unwrap();
    }
    MessageDecoder::new(reader).with_store(store)
}

#[test]
fn test_added_field_takes_default() {
    let bytes = MessageEncoder::new(user_v1())
        .encode(&Value::record([("id", Value::Long(7)), ("name", Value::from("Ada"))]))
        .unwrap();
    let decoder = decoder_with(user_v2(), &[user_v1()]);
    let value = decoder.decode(&bytes).unwrap();
    assert_eq!(value.field("tags"), Some(&Value::Array(vec![])));
    assert_eq!(value.field("id"), Some(&Value::Long(7)));
}

#[test]
fn test_removed_field_is_skipped() {
    let writer = user_v2();
    let bytes = MessageEncoder::new(writer.clone())
        .encode(&Value::record([
            ("id", Value::Long(7)),
            ("name", Value::from("Ada")),
            ("tags", Value::from(vec!["a", "b", "c"])),
        ]))
        .unwrap();
    let decoder = decoder_with(user_v1(), &[writer]);
    assert_eq!(
        decoder.decode(&bytes).unwrap(),
        Value::record([("id", Value::Long(7)), ("name", Value::from("Ada"))])
    );
}

#[test]
fn test_unregistered_writer_is_missing_schema() {
    let bytes = MessageEncoder::new(user_v1())
        .encode(&Value::record([("id", Value::Long(1)), ("name", Value::from("x"))]))
        .unwrap();
    let decoder = decoder_with(user_v2(), &[]);
    let err = decoder.decode(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingSchema);
    assert!(err.is_retryable());
    assert!(matches!(
        err,
        CodecError::MissingSchema { fingerprint: Fingerprint::Rabin(fp) } if fp == user_v1().rabin()
    ));
}

#[test]
fn test_missing_default_is_incompatible() {
    let bytes = MessageEncoder::new(user_v1())
        .encode(&Value::record([("id", Value::Long(1)), ("name", Value::from("x"))]))
        .unwrap();
    let reader = SchemaEntry::new(
        RecordSchema::new(
            "familiar.message.User",
            vec![RecordField::new("id", Schema::Long), RecordField::new("email", Schema::String)],
        )
        .into(),
    )
    .unwrap();
    let err = decoder_with(reader, &[user_v1()]).decode(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleSchema);
    assert!(!err.is_retryable());
}

#[test]
fn test_promoted_fields() {
    let writer = SchemaEntry::new(
        RecordSchema::new(
            "familiar.Reading",
            vec![
                RecordField::new("count", Schema::Int),
                RecordField::new("total", Schema::Long),
                RecordField::new("mean", Schema::Float),
            ],
        )
        .into(),
    )
    .unwrap();
    let reader = SchemaEntry::new(
        RecordSchema::new(
            "familiar.Reading",
            vec![
                RecordField::new("count", Schema::Long),
                RecordField::new("total", Schema::Double),
                RecordField::new("mean", Schema::Double),
            ],
        )
        .into(),
    )
    .unwrap();
    let bytes = MessageEncoder::new(writer.clone())
        .encode(&Value::record([
            ("count", Value::Int(3)),
            ("total", Value::Long(-12)),
            ("mean", Value::Float(0.5)),
        ]))
        .unwrap();
    assert_eq!(
        decoder_with(reader, &[writer]).decode(&bytes).unwrap(),
        Value::record([
            ("count", Value::Long(3)),
            ("total", Value::Double(-12.0)),
            ("mean", Value::Double(0.5)),
        ])
    );
}

#[test]
fn test_renamed_record_and_field_via_aliases() {
    let writer = SchemaEntry::new(
        RecordSchema::new("legacy.Account", vec![RecordField::new("user_name", Schema::String)]).into(),
    )
    .unwrap();
    let reader = SchemaEntry::new(
        RecordSchema::new(
            "familiar.Account",
            vec![RecordField::new("login", Schema::String).with_aliases(&["user_name"])],
        )
        .with_aliases(&["legacy.Account"])
        .into(),
    )
    .unwrap();
    let bytes = MessageEncoder::new(writer.clone())
        .encode(&Value::record([("user_name", Value::from("ada"))]))
        .unwrap();
    assert_eq!(
        decoder_with(reader, &[writer]).decode(&bytes).unwrap(),
        Value::record([("login", Value::from("ada"))])
    );
}

#[test]
fn test_enum_default_for_unknown_symbol() {
    let writer = SchemaEntry::new(EnumSchema::new("familiar.Status", &["ACTIVE", "SUSPENDED", "DELETED"]).into()).unwrap();
    let reader = SchemaEntry::new(
        EnumSchema::new("familiar.Status", &["UNKNOWN", "ACTIVE", "DELETED"])
            .with_default("UNKNOWN")
            .into(),
    )
    .unwrap();
    let encoder = MessageEncoder::new(writer.clone());
    let decoder = decoder_with(reader, &[writer]);

    let deleted = encoder.encode(&Value::Enum(2, "DELETED".into())).unwrap();
    assert_eq!(decoder.decode(&deleted).unwrap(), Value::Enum(2, "DELETED".into()));

    let suspended = encoder.encode(&Value::Enum(1, "SUSPENDED".into())).unwrap();
    assert_eq!(decoder.decode(&suspended).unwrap(), Value::Enum(0, "UNKNOWN".into()));
}

#[test]
fn test_optional_field_widening() {
    let writer = SchemaEntry::new(
        RecordSchema::new("familiar.Profile", vec![RecordField::new("age", Schema::Int)]).into(),
    )
    .unwrap();
    let reader = SchemaEntry::new(
        RecordSchema::new(
            "familiar.Profile",
            vec![RecordField::new("age", Schema::union(vec![Schema::Null, Schema::Long])).with_default(json!(null))],
        )
        .into(),
    )
    .unwrap();
    let bytes = MessageEncoder::new(writer.clone())
        .encode(&Value::record([("age", Value::Int(40))]))
        .unwrap();
    assert_eq!(
        decoder_with(reader, &[writer]).decode(&bytes).unwrap(),
        Value::record([("age", Value::Union(1, Box::new(Value::Long(40))))])
    );
}

#[test]
fn test_fixed_size_mismatch_is_incompatible() {
    let writer = SchemaEntry::new(FixedSchema::new("familiar.Digest", 16).into()).unwrap();
    let reader = SchemaEntry::new(FixedSchema::new("familiar.Digest", 32).into()).unwrap();
    let bytes = MessageEncoder::new(writer.clone()).encode(&Value::Fixed(vec![0; 16])).unwrap();
    assert!(matches!(
        decoder_with(reader, &[writer]).decode(&bytes),
        Err(CodecError::IncompatibleSchema(_))
    ));
}

#[test]
fn test_shared_decoder_across_threads() {
    let writer = user_v1();
    let decoder = Arc::new(decoder_with(user_v2(), &[writer.clone()]));
    let encoder = Arc::new(MessageEncoder::new(writer));

    let handles: Vec<_> = (0..8i64)
        .map(|i| {
            let decoder = decoder.clone();
            let encoder = encoder.clone();
            std::thread::spawn(move || {
                let bytes = encoder
                    .encode(&Value::record([("id", Value::Long(i)), ("name", Value::from("t"))]))
                    .unwrap();
                decoder.decode(&bytes).unwrap()
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap().field("id"), Some(&Value::Long(i as i64)));
    }
    assert_eq!(decoder.cached_plans(), 1);
}
