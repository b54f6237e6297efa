//! Schema Resolution
//!
//! Builds a [`ResolutionPlan`] describing how to read bytes written under a
//! writer schema as values shaped by a reader schema, then executes it.
//!
//! Plan construction is a pure function of the two schemas. It decides:
//! - field correspondence (by name, then reader aliases), skipped writer
//!   fields and injected reader defaults
//! - enum symbol remapping, with the reader default as fallback
//! - union branch selection (exact kind/name first, then promotion)
//! - numeric promotions: int→long→float→double
//!
//! Structural mismatches fail at construction. Enum symbols and union
//! branches that cannot be mapped are recorded in the plan and only fail
//! when a message actually contains them.

use std::collections::HashMap;

use tracing::debug;

use crate::codec::Reader;
use crate::decode::{min_width, read_blocks, read_index, skip_value};
use crate::error::{CodecError, Result};
use crate::schema::{EnumSchema, Name, RecordSchema, Schema, SchemaEntry, SchemaId};
use crate::value::{default_value, Value};

// =============================================================================
// Plan Types
// =============================================================================

/// Numeric widening applied while reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    IntToLong,
    IntToFloat,
    IntToDouble,
    LongToFloat,
    LongToDouble,
    FloatToDouble,
}

/// Reader-side outcome for one writer enum symbol
#[derive(Debug, Clone, PartialEq)]
pub enum EnumSymbol {
    Mapped { index: u32, symbol: String },
    /// Writer symbol absent from the reader, which declares no default
    Missing(String),
}

/// Reader-side outcome for one writer union branch
#[derive(Debug, Clone)]
pub enum BranchPlan {
    Resolved(Plan),
    Unmatched(String),
}

/// What to do with one writer field
#[derive(Debug, Clone)]
pub enum FieldStep {
    Read { reader_pos: usize, plan: Plan },
    Skip(Schema),
}

/// Plan for a writer record read as a reader record
#[derive(Debug, Clone)]
pub struct RecordPlan {
    /// Reader record name
    pub name: Name,
    /// Reader field names in reader order
    pub reader_fields: Vec<String>,
    /// One step per writer field, in writer order
    pub steps: Vec<FieldStep>,
    /// Reader fields missing from the writer, with their default values
    pub defaults: Vec<(usize, Value)>,
}

/// A node of a resolution plan
#[derive(Debug, Clone)]
pub enum Plan {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Promote(Promotion),
    Fixed(usize),
    /// Indexed by writer symbol position
    Enum(Vec<EnumSymbol>),
    /// `width` is the fewest bytes one writer item encodes to
    Array { items: Box<Plan>, width: usize },
    Map { values: Box<Plan>, width: usize },
    Record(RecordPlan),
    /// Writer wrote a union; indexed by writer branch
    WriterUnion(Vec<BranchPlan>),
    /// Writer wrote a single type that the reader holds in a union branch
    ReaderUnion { index: u32, plan: Box<Plan> },
    /// Shared record plan, used for recursive types
    Named(usize),
}

// =============================================================================
// Resolution Plan
// =============================================================================

/// A cacheable plan for one writer/reader pair
#[derive(Debug)]
pub struct ResolutionPlan {
    writer: SchemaEntry,
    reader_id: SchemaId,
    root: Plan,
    named: Vec<Option<Plan>>,
}

impl ResolutionPlan {
    /// Build the plan for reading `writer` data as `reader` values
    pub fn build(writer: &SchemaEntry, reader: &SchemaEntry) -> Result<Self> {
        let mut resolver = Resolver {
            writer,
            reader,
            named: Vec::new(),
            index: HashMap::new(),
        };
        let root = resolver.resolve(writer.schema(), reader.schema())?;
        debug!(
            writer = %writer.full_name(),
            writer_fingerprint = %format!("{:016x}", writer.rabin()),
            reader = %reader.full_name(),
            named_plans = resolver.named.len(),
            "built resolution plan"
        );
        Ok(Self {
            writer: writer.clone(),
            reader_id: reader.id(),
            root,
            named: resolver.named,
        })
    }

    pub fn writer(&self) -> &SchemaEntry {
        &self.writer
    }

    pub fn reader_id(&self) -> SchemaId {
        self.reader_id
    }

    pub fn root(&self) -> &Plan {
        &self.root
    }

    /// Read one value through the plan
    pub fn read(&self, r: &mut Reader<'_>) -> Result<Value> {
        self.read_plan(r, &self.root)
    }

    fn read_plan(&self, r: &mut Reader<'_>, plan: &Plan) -> Result<Value> {
        r.enter()?;
        let value = self.read_node(r, plan);
        r.leave();
        value
    }

    fn read_node(&self, r: &mut Reader<'_>, plan: &Plan) -> Result<Value> {
        let value = match plan {
            Plan::Null => Value::Null,
            Plan::Boolean => Value::Boolean(r.read_boolean()?),
            Plan::Int => Value::Int(r.read_int()?),
            Plan::Long => Value::Long(r.read_long()?),
            Plan::Float => Value::Float(r.read_float()?),
            Plan::Double => Value::Double(r.read_double()?),
            Plan::Bytes => Value::Bytes(r.read_bytes()?.to_vec()),
            Plan::String => Value::String(r.read_string()?),
            Plan::Promote(promotion) => match promotion {
                Promotion::IntToLong => Value::Long(r.read_int()? as i64),
                Promotion::IntToFloat => Value::Float(r.read_int()? as f32),
                Promotion::IntToDouble => Value::Double(r.read_int()? as f64),
                Promotion::LongToFloat => Value::Float(r.read_long()? as f32),
                Promotion::LongToDouble => Value::Double(r.read_long()? as f64),
                Promotion::FloatToDouble => Value::Double(r.read_float()? as f64),
            },
            Plan::Fixed(size) => Value::Fixed(r.read_exact(*size)?.to_vec()),
            Plan::Enum(symbols) => match &symbols[read_index(r, symbols.len(), "enum symbol")?] {
                EnumSymbol::Mapped { index, symbol } => Value::Enum(*index, symbol.clone()),
                EnumSymbol::Missing(symbol) => {
                    return Err(CodecError::incompatible(format!(
                        "writer enum symbol '{}' is unknown to the reader, which declares no default",
                        symbol
                    )));
                }
            },
            Plan::Array { items, width } => {
                let mut list = Vec::new();
                read_blocks(r, *width, |r| {
                    list.push(self.read_plan(r, items)?);
                    Ok(())
                })?;
                Value::Array(list)
            }
            Plan::Map { values, width } => {
                let mut map = std::collections::BTreeMap::new();
                read_blocks(r, *width, |r| {
                    let key = r.read_string()?;
                    map.insert(key, self.read_plan(r, values)?);
                    Ok(())
                })?;
                Value::Map(map)
            }
            Plan::Record(record) => self.read_record(r, record)?,
            Plan::WriterUnion(branches) => match &branches[read_index(r, branches.len(), "union branch")?] {
                BranchPlan::Resolved(plan) => self.read_plan(r, plan)?,
                BranchPlan::Unmatched(reason) => return Err(CodecError::incompatible(reason.clone())),
            },
            Plan::ReaderUnion { index, plan } => Value::Union(*index, Box::new(self.read_plan(r, plan)?)),
            Plan::Named(slot) => match self.named.get(*slot).and_then(Option::as_ref) {
                Some(plan) => self.read_plan(r, plan)?,
                None => {
                    return Err(CodecError::incompatible(format!(
                        "recursive record plan {} was never resolved",
                        slot
                    )));
                }
            },
        };
        Ok(value)
    }

    fn read_record(&self, r: &mut Reader<'_>, record: &RecordPlan) -> Result<Value> {
        let mut slots: Vec<Option<Value>> = vec![None; record.reader_fields.len()];
        for step in &record.steps {
            match step {
                FieldStep::Read { reader_pos, plan } => slots[*reader_pos] = Some(self.read_plan(r, plan)?),
                FieldStep::Skip(schema) => skip_value(r, schema, &self.writer)?,
            }
        }
        for (pos, default) in &record.defaults {
            slots[*pos] = Some(default.clone());
        }
        record
            .reader_fields
            .iter()
            .zip(slots)
            .map(|(name, value)| {
                value.map(|v| (name.clone(), v)).ok_or_else(|| {
                    CodecError::incompatible(format!("record {} field '{}' has no source", record.name, name))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Record)
    }
}

/// Build a plan; shorthand for [`ResolutionPlan::build`]
pub fn resolve(writer: &SchemaEntry, reader: &SchemaEntry) -> Result<ResolutionPlan> {
    ResolutionPlan::build(writer, reader)
}

/// Whether every message written under `writer` can be read as `reader`
/// without failing at plan construction
pub fn can_read(writer: &SchemaEntry, reader: &SchemaEntry) -> bool {
    writer.same_form(reader) || ResolutionPlan::build(writer, reader).is_ok()
}

// =============================================================================
// Resolver
// =============================================================================

struct Resolver<'a> {
    writer: &'a SchemaEntry,
    reader: &'a SchemaEntry,
    named: Vec<Option<Plan>>,
    index: HashMap<(Name, Name), usize>,
}

impl<'a> Resolver<'a> {
    fn resolve(&mut self, writer: &'a Schema, reader: &'a Schema) -> Result<Plan> {
        let w = self.writer.resolve(writer)?;
        let r = self.reader.resolve(reader)?;

        let plan = match (w, r) {
            (Schema::Union(union), _) => Plan::WriterUnion(
                union
                    .variants
                    .iter()
                    .map(|branch| match self.resolve(branch, r) {
                        Ok(plan) => BranchPlan::Resolved(plan),
                        Err(e) => BranchPlan::Unmatched(format!(
                            "writer union branch {} cannot be read as {}: {}",
                            branch.describe(),
                            r.describe(),
                            e
                        )),
                    })
                    .collect(),
            ),
            (_, Schema::Union(union)) => {
                let (index, plan) = self.match_branch(w, &union.variants)?;
                Plan::ReaderUnion {
                    index: index as u32,
                    plan: Box::new(plan),
                }
            }
            (Schema::Null, Schema::Null) => Plan::Null,
            (Schema::Boolean, Schema::Boolean) => Plan::Boolean,
            (Schema::Int, Schema::Int) => Plan::Int,
            (Schema::Long, Schema::Long) => Plan::Long,
            (Schema::Float, Schema::Float) => Plan::Float,
            (Schema::Double, Schema::Double) => Plan::Double,
            (Schema::Bytes, Schema::Bytes) => Plan::Bytes,
            (Schema::String, Schema::String) => Plan::String,
            (Schema::Int, Schema::Long) => Plan::Promote(Promotion::IntToLong),
            (Schema::Int, Schema::Float) => Plan::Promote(Promotion::IntToFloat),
            (Schema::Int, Schema::Double) => Plan::Promote(Promotion::IntToDouble),
            (Schema::Long, Schema::Float) => Plan::Promote(Promotion::LongToFloat),
            (Schema::Long, Schema::Double) => Plan::Promote(Promotion::LongToDouble),
            (Schema::Float, Schema::Double) => Plan::Promote(Promotion::FloatToDouble),
            (Schema::Fixed(wf), Schema::Fixed(rf)) => {
                check_names(&wf.name, r)?;
                if wf.size != rf.size {
                    return Err(CodecError::incompatible(format!(
                        "fixed {} is {} bytes in the writer and {} in the reader",
                        rf.name, wf.size, rf.size
                    )));
                }
                Plan::Fixed(rf.size)
            }
            (Schema::Enum(we), Schema::Enum(re)) => {
                check_names(&we.name, r)?;
                Plan::Enum(map_symbols(we, re))
            }
            (Schema::Array { items: wi }, Schema::Array { items: ri }) => Plan::Array {
                items: Box::new(self.resolve(wi, ri)?),
                width: min_width(wi, self.writer),
            },
            (Schema::Map { values: wv }, Schema::Map { values: rv }) => Plan::Map {
                values: Box::new(self.resolve(wv, rv)?),
                width: 1 + min_width(wv, self.writer),
            },
            (Schema::Record(wr), Schema::Record(rr)) => {
                check_names(&wr.name, r)?;
                let key = (wr.name.clone(), rr.name.clone());
                if let Some(slot) = self.index.get(&key) {
                    return Ok(Plan::Named(*slot));
                }
                let slot = self.named.len();
                self.named.push(None);
                self.index.insert(key.clone(), slot);
                match self.resolve_record(wr, rr) {
                    Ok(plan) => {
                        self.named[slot] = Some(Plan::Record(plan));
                        Plan::Named(slot)
                    }
                    Err(e) => {
                        self.index.remove(&key);
                        return Err(e);
                    }
                }
            }
            (w, r) => {
                return Err(CodecError::incompatible(format!(
                    "writer type {} cannot be read as {}",
                    w.describe(),
                    r.describe()
                )));
            }
        };
        Ok(plan)
    }

    /// Pick the reader union branch for a non-union writer type: the first
    /// branch of the same kind (and name), else the first one that resolves
    fn match_branch(&mut self, writer: &'a Schema, branches: &'a [Schema]) -> Result<(usize, Plan)> {
        for (i, branch) in branches.iter().enumerate() {
            let candidate = self.reader.resolve(branch)?;
            if same_kind(writer, candidate) {
                if let Ok(plan) = self.resolve(writer, branch) {
                    return Ok((i, plan));
                }
            }
        }
        for (i, branch) in branches.iter().enumerate() {
            if let Ok(plan) = self.resolve(writer, branch) {
                return Ok((i, plan));
            }
        }
        Err(CodecError::incompatible(format!(
            "writer type {} matches no branch of the reader union",
            writer.describe()
        )))
    }

    fn resolve_record(&mut self, writer: &'a RecordSchema, reader: &'a RecordSchema) -> Result<RecordPlan> {
        // writer field index -> reader field index
        let mut targets: Vec<Option<usize>> = writer
            .fields
            .iter()
            .map(|wf| reader.fields.iter().position(|rf| rf.name == wf.name))
            .collect();
        for (wi, wf) in writer.fields.iter().enumerate() {
            if targets[wi].is_some() {
                continue;
            }
            targets[wi] = reader.fields.iter().enumerate().position(|(ri, rf)| {
                !targets.contains(&Some(ri)) && rf.aliases.iter().any(|alias| *alias == wf.name)
            });
        }

        let mut steps = Vec::with_capacity(writer.fields.len());
        for (wf, target) in writer.fields.iter().zip(&targets) {
            steps.push(match target {
                Some(pos) => FieldStep::Read {
                    reader_pos: *pos,
                    plan: self.resolve(&wf.schema, &reader.fields[*pos].schema)?,
                },
                None => FieldStep::Skip(wf.schema.clone()),
            });
        }

        let mut defaults = Vec::new();
        for (pos, rf) in reader.fields.iter().enumerate() {
            if targets.contains(&Some(pos)) {
                continue;
            }
            let literal = rf.default.as_ref().ok_or_else(|| {
                CodecError::incompatible(format!(
                    "reader field '{}' of {} is missing from the writer and has no default",
                    rf.name, reader.name
                ))
            })?;
            defaults.push((pos, default_value(literal, &rf.schema, self.reader)?));
        }

        Ok(RecordPlan {
            name: reader.name.clone(),
            reader_fields: reader.fields.iter().map(|f| f.name.clone()).collect(),
            steps,
            defaults,
        })
    }
}

/// Writer name must equal the reader name or one of the reader's aliases
fn check_names(writer: &Name, reader: &Schema) -> Result<()> {
    if names_match(writer, reader) {
        Ok(())
    } else {
        Err(CodecError::incompatible(format!(
            "writer type {} does not match reader type {}",
            writer,
            reader.describe()
        )))
    }
}

fn names_match(writer: &Name, reader: &Schema) -> bool {
    match reader.name() {
        Some(name) => name == writer || reader.aliases().iter().any(|alias| name.qualify(alias) == *writer),
        None => false,
    }
}

fn same_kind(writer: &Schema, reader: &Schema) -> bool {
    match writer.name() {
        Some(name) => writer.kind() == reader.kind() && names_match(name, reader),
        None => writer.kind() == reader.kind(),
    }
}

fn map_symbols(writer: &EnumSchema, reader: &EnumSchema) -> Vec<EnumSymbol> {
    let fallback = reader
        .default
        .as_ref()
        .and_then(|d| reader.index_of(d).map(|i| (i, d)));
    writer
        .symbols
        .iter()
        .map(|symbol| match reader.index_of(symbol).map(|i| (i, symbol)).or(fallback) {
            Some((index, symbol)) => EnumSymbol::Mapped {
                index: index as u32,
                symbol: symbol.clone(),
            },
            None => EnumSymbol::Missing(symbol.clone()),
        })
        .collect()
}
