//! Parsing Canonical Form
//!
//! Reduces a schema to a deterministic, whitespace-free text so that
//! fingerprints only depend on what affects the binary layout:
//!
//! - primitives are bare strings (`"long"`)
//! - named types are inlined once, then referenced by full name
//! - records keep `name`, `type`, `fields`; fields keep `name`, `type`
//! - enums keep `name`, `type`, `symbols`; fixed keeps `name`, `type`, `size`
//! - docs, aliases and defaults never appear
//!
//! Attributes are always emitted in the order
//! `name, type, fields, symbols, items, values, size`.

use std::collections::HashSet;

use crate::error::{CodecError, Result};
use crate::schema::{Name, Schema};

/// Compute the canonical form of a schema
pub fn canonical_form(schema: &Schema) -> Result<String> {
    let mut out = String::new();
    let mut defined = HashSet::new();
    write_schema(schema, &mut defined, &mut out)?;
    Ok(out)
}

fn write_schema(schema: &Schema, defined: &mut HashSet<Name>, out: &mut String) -> Result<()> {
    match schema {
        Schema::Null
        | Schema::Boolean
        | Schema::Int
        | Schema::Long
        | Schema::Float
        | Schema::Double
        | Schema::Bytes
        | Schema::String => {
            out.push('"');
            out.push_str(schema.kind().as_str());
            out.push('"');
        }
        Schema::Ref { name } => {
            if !defined.contains(name) {
                return Err(CodecError::invalid(format!(
                    "type {} is referenced before its definition",
                    name
                )));
            }
            write_str(&name.fullname(), out)?;
        }
        Schema::Record(record) => {
            if !defined.insert(record.name.clone()) {
                return write_str(&record.name.fullname(), out);
            }
            write_header(&record.name, "record", out)?;
            out.push_str(",\"fields\":[");
            for (i, field) in record.fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str("{\"name\":");
                write_str(&field.name, out)?;
                out.push_str(",\"type\":");
                write_schema(&field.schema, defined, out)?;
                out.push('}');
            }
            out.push_str("]}");
        }
        Schema::Enum(e) => {
            if !defined.insert(e.name.clone()) {
                return write_str(&e.name.fullname(), out);
            }
            write_header(&e.name, "enum", out)?;
            out.push_str(",\"symbols\":[");
            for (i, symbol) in e.symbols.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_str(symbol, out)?;
            }
            out.push_str("]}");
        }
        Schema::Fixed(f) => {
            if !defined.insert(f.name.clone()) {
                return write_str(&f.name.fullname(), out);
            }
            write_header(&f.name, "fixed", out)?;
            out.push_str(&format!(",\"size\":{}}}", f.size));
        }
        Schema::Array { items } => {
            out.push_str("{\"type\":\"array\",\"items\":");
            write_schema(items, defined, out)?;
            out.push('}');
        }
        Schema::Map { values } => {
            out.push_str("{\"type\":\"map\",\"values\":");
            write_schema(values, defined, out)?;
            out.push('}');
        }
        Schema::Union(union) => {
            out.push('[');
            for (i, variant) in union.variants.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_schema(variant, defined, out)?;
            }
            out.push(']');
        }
    }
    Ok(())
}

/// Opens a named type object: `{"name":"<full>","type":"<kind>"`
fn write_header(name: &Name, kind: &str, out: &mut String) -> Result<()> {
    out.push_str("{\"name\":");
    write_str(&name.fullname(), out)?;
    out.push_str(",\"type\":\"");
    out.push_str(kind);
    out.push('"');
    Ok(())
}

fn write_str(s: &str, out: &mut String) -> Result<()> {
    out.push_str(&serde_json::to_string(s)?);
    Ok(())
}
