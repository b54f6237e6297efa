//! Schema types and structures
//!
//! A [`Schema`] is an immutable tree with a closed set of node kinds. Named
//! types (record, enum, fixed) may be referenced elsewhere in the same tree
//! through [`Schema::Ref`], which is how recursive types are expressed.
//!
//! A [`SchemaEntry`] is a validated schema bound to a process-unique identity.
//! Entries memoize their canonical form and fingerprints, and are what the
//! encoder, decoder and stores pass around.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Deserializer, Serialize};

use crate::canonical;
use crate::error::{CodecError, Result};
use crate::fingerprint::{self, Fingerprint, FingerprintAlgorithm};

// =============================================================================
// Names
// =============================================================================

/// Full name of a named type: namespace plus simple name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl Name {
    /// Parse a possibly dotted full name (e.g. "familiar.message.TestRecord")
    pub fn new(fullname: &str) -> Self {
        match fullname.rsplit_once('.') {
            Some((namespace, name)) if !namespace.is_empty() => Self {
                name: name.to_string(),
                namespace: Some(namespace.to_string()),
            },
            _ => Self {
                name: fullname.trim_start_matches('.').to_string(),
                namespace: None,
            },
        }
    }

    /// Create a name in an explicit namespace
    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            name: name.into(),
            namespace: if namespace.is_empty() { None } else { Some(namespace) },
        }
    }

    /// Get the dotted full name
    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    /// Qualify an alias declared on this name; aliases without a namespace
    /// live in this name's namespace
    pub(crate) fn qualify(&self, alias: &Name) -> Name {
        match alias.namespace {
            Some(_) => alias.clone(),
            None => Name {
                name: alias.name.clone(),
                namespace: self.namespace.clone(),
            },
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}.{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// Schema Tree
// =============================================================================

/// A schema node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schema {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Record(RecordSchema),
    Enum(EnumSchema),
    Array { items: Box<Schema> },
    Map { values: Box<Schema> },
    Union(UnionSchema),
    Fixed(FixedSchema),
    /// Reference to a named type defined elsewhere in the same tree
    Ref { name: Name },
}

/// Kind of a schema node, without its contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Bytes,
    String,
    Record,
    Enum,
    Array,
    Map,
    Union,
    Fixed,
    Ref,
}

impl SchemaKind {
    /// Name of the kind as it appears in canonical form
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Null => "null",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Int => "int",
            SchemaKind::Long => "long",
            SchemaKind::Float => "float",
            SchemaKind::Double => "double",
            SchemaKind::Bytes => "bytes",
            SchemaKind::String => "string",
            SchemaKind::Record => "record",
            SchemaKind::Enum => "enum",
            SchemaKind::Array => "array",
            SchemaKind::Map => "map",
            SchemaKind::Union => "union",
            SchemaKind::Fixed => "fixed",
            SchemaKind::Ref => "ref",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub name: Name,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub fields: Vec<RecordField>,
}

/// A single record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    #[serde(rename = "type")]
    pub schema: Schema,
    /// Default literal used when a reader field is missing from the writer.
    /// `Some(Value::Null)` is a declared null default, `None` is no default.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// An enum type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumSchema {
    pub name: Name,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A union of branch types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionSchema {
    pub variants: Vec<Schema>,
}

/// A fixed-size byte array type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedSchema {
    pub name: Name,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Name>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
    pub size: usize,
}

/// Keeps an explicit `null` default distinct from an absent one
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl Schema {
    pub fn array(items: Schema) -> Self {
        Schema::Array { items: Box::new(items) }
    }

    pub fn map(values: Schema) -> Self {
        Schema::Map { values: Box::new(values) }
    }

    pub fn union(variants: Vec<Schema>) -> Self {
        Schema::Union(UnionSchema { variants })
    }

    pub fn reference(name: impl Into<Name>) -> Self {
        Schema::Ref { name: name.into() }
    }

    /// Get the kind of this node
    pub fn kind(&self) -> SchemaKind {
        match self {
            Schema::Null => SchemaKind::Null,
            Schema::Boolean => SchemaKind::Boolean,
            Schema::Int => SchemaKind::Int,
            Schema::Long => SchemaKind::Long,
            Schema::Float => SchemaKind::Float,
            Schema::Double => SchemaKind::Double,
            Schema::Bytes => SchemaKind::Bytes,
            Schema::String => SchemaKind::String,
            Schema::Record(_) => SchemaKind::Record,
            Schema::Enum(_) => SchemaKind::Enum,
            Schema::Array { .. } => SchemaKind::Array,
            Schema::Map { .. } => SchemaKind::Map,
            Schema::Union(_) => SchemaKind::Union,
            Schema::Fixed(_) => SchemaKind::Fixed,
            Schema::Ref { .. } => SchemaKind::Ref,
        }
    }

    /// Get the full name of a named type or reference
    pub fn name(&self) -> Option<&Name> {
        match self {
            Schema::Record(r) => Some(&r.name),
            Schema::Enum(e) => Some(&e.name),
            Schema::Fixed(f) => Some(&f.name),
            Schema::Ref { name } => Some(name),
            _ => None,
        }
    }

    /// Get the aliases of a named type
    pub fn aliases(&self) -> &[Name] {
        match self {
            Schema::Record(r) => &r.aliases,
            Schema::Enum(e) => &e.aliases,
            Schema::Fixed(f) => &f.aliases,
            _ => &[],
        }
    }

    /// Human-readable label for diagnostics: the full name for named types,
    /// the kind otherwise
    pub fn describe(&self) -> String {
        match self.name() {
            Some(name) => name.fullname(),
            None => self.kind().to_string(),
        }
    }
}

impl RecordSchema {
    pub fn new(name: impl Into<Name>, fields: Vec<RecordField>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            doc: None,
            fields,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| Name::new(a)).collect();
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Find a field by name
    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl From<RecordSchema> for Schema {
    fn from(record: RecordSchema) -> Self {
        Schema::Record(record)
    }
}

impl RecordField {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            default: None,
            doc: None,
            aliases: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

impl EnumSchema {
    pub fn new(name: impl Into<Name>, symbols: &[&str]) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            doc: None,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            default: None,
        }
    }

    pub fn with_default(mut self, symbol: impl Into<String>) -> Self {
        self.default = Some(symbol.into());
        self
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| Name::new(a)).collect();
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Position of a symbol in the declared order
    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }
}

impl From<EnumSchema> for Schema {
    fn from(e: EnumSchema) -> Self {
        Schema::Enum(e)
    }
}

impl FixedSchema {
    pub fn new(name: impl Into<Name>, size: usize) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            doc: None,
            size,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| Name::new(a)).collect();
        self
    }
}

impl From<FixedSchema> for Schema {
    fn from(f: FixedSchema) -> Self {
        Schema::Fixed(f)
    }
}

// =============================================================================
// Name Table and Validation
// =============================================================================

/// Named type definitions reachable from a root schema
pub(crate) type Names = HashMap<Name, Schema>;

/// Collect every named definition, rejecting duplicates, dangling references
/// and malformed unions, records and enums
pub(crate) fn collect_names(root: &Schema) -> Result<Names> {
    let mut names = Names::new();
    define(root, &mut names)?;
    check_refs(root, &names)?;
    Ok(names)
}

fn define(schema: &Schema, names: &mut Names) -> Result<()> {
    match schema {
        Schema::Record(record) => {
            insert_name(&record.name, schema, names)?;
            let mut seen = HashSet::new();
            for field in &record.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(CodecError::invalid(format!(
                        "record {} declares field '{}' twice",
                        record.name, field.name
                    )));
                }
                define(&field.schema, names)?;
            }
            Ok(())
        }
        Schema::Enum(e) => {
            let mut seen = HashSet::new();
            for symbol in &e.symbols {
                if !seen.insert(symbol.as_str()) {
                    return Err(CodecError::invalid(format!(
                        "enum {} declares symbol '{}' twice",
                        e.name, symbol
                    )));
                }
            }
            if let Some(default) = &e.default {
                if !seen.contains(default.as_str()) {
                    return Err(CodecError::invalid(format!(
                        "enum {} default '{}' is not one of its symbols",
                        e.name, default
                    )));
                }
            }
            insert_name(&e.name, schema, names)
        }
        Schema::Fixed(f) => insert_name(&f.name, schema, names),
        Schema::Array { items } => define(items, names),
        Schema::Map { values } => define(values, names),
        Schema::Union(union) => {
            check_union(union)?;
            for variant in &union.variants {
                define(variant, names)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn insert_name(name: &Name, schema: &Schema, names: &mut Names) -> Result<()> {
    if names.insert(name.clone(), schema.clone()).is_some() {
        return Err(CodecError::invalid(format!("named type {} is defined twice", name)));
    }
    Ok(())
}

fn check_union(union: &UnionSchema) -> Result<()> {
    let mut kinds = HashSet::new();
    let mut named = HashSet::new();
    for variant in &union.variants {
        match variant.name() {
            Some(name) => {
                if !named.insert(name.clone()) {
                    return Err(CodecError::invalid(format!(
                        "union contains {} more than once",
                        name
                    )));
                }
            }
            None => {
                if variant.kind() == SchemaKind::Union {
                    return Err(CodecError::invalid("union may not directly contain a union"));
                }
                if !kinds.insert(variant.kind()) {
                    return Err(CodecError::invalid(format!(
                        "union contains more than one {} branch",
                        variant.kind()
                    )));
                }
            }
        }
    }
    Ok(())
}

fn check_refs(schema: &Schema, names: &Names) -> Result<()> {
    match schema {
        Schema::Ref { name } if !names.contains_key(name) => Err(CodecError::invalid(format!(
            "reference to undefined type {}",
            name
        ))),
        Schema::Record(record) => record.fields.iter().try_for_each(|f| check_refs(&f.schema, names)),
        Schema::Array { items } => check_refs(items, names),
        Schema::Map { values } => check_refs(values, names),
        Schema::Union(union) => union.variants.iter().try_for_each(|v| check_refs(v, names)),
        _ => Ok(()),
    }
}

// =============================================================================
// Schema Entry
// =============================================================================

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a schema instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u64);

impl SchemaId {
    fn next() -> Self {
        Self(NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A validated schema bound to an identity
///
/// Clones share the identity and the memoized canonical form and
/// fingerprints. Two entries built from equal trees are distinct instances
/// with equal fingerprints.
#[derive(Clone)]
pub struct SchemaEntry {
    inner: Arc<EntryInner>,
}

struct EntryInner {
    id: SchemaId,
    schema: Schema,
    names: Names,
    canonical: String,
    rabin: OnceLock<u64>,
    md5: OnceLock<Fingerprint>,
    sha256: OnceLock<Fingerprint>,
}

impl SchemaEntry {
    /// Validate a schema and bind it to a fresh identity
    pub fn new(schema: Schema) -> Result<Self> {
        let names = collect_names(&schema)?;
        let canonical = canonical::canonical_form(&schema)?;
        Ok(Self {
            inner: Arc::new(EntryInner {
                id: SchemaId::next(),
                schema,
                names,
                canonical,
                rabin: OnceLock::new(),
                md5: OnceLock::new(),
                sha256: OnceLock::new(),
            }),
        })
    }

    pub fn id(&self) -> SchemaId {
        self.inner.id
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Get the Parsing Canonical Form of this schema
    pub fn canonical_form(&self) -> &str {
        &self.inner.canonical
    }

    /// Get the fingerprint for an algorithm
    pub fn fingerprint(&self, algorithm: FingerprintAlgorithm) -> Fingerprint {
        let canonical = self.inner.canonical.as_bytes();
        match algorithm {
            FingerprintAlgorithm::Rabin => Fingerprint::Rabin(self.rabin()),
            FingerprintAlgorithm::Md5 => publish_once(&self.inner.md5, || {
                fingerprint::digest(canonical, FingerprintAlgorithm::Md5)
            })
            .clone(),
            FingerprintAlgorithm::Sha256 => publish_once(&self.inner.sha256, || {
                fingerprint::digest(canonical, FingerprintAlgorithm::Sha256)
            })
            .clone(),
        }
    }

    /// The 64-bit Rabin fingerprint used in message headers
    pub fn rabin(&self) -> u64 {
        *publish_once(&self.inner.rabin, || fingerprint::rabin(self.inner.canonical.as_bytes()))
    }

    /// Full name of the root type, or its kind when unnamed
    pub fn full_name(&self) -> String {
        self.inner.schema.describe()
    }

    /// Whether two entries have the same canonical form
    pub fn same_form(&self, other: &SchemaEntry) -> bool {
        self.inner.id == other.inner.id || self.inner.canonical == other.inner.canonical
    }

    /// Follow references until a concrete node is reached
    pub(crate) fn resolve<'a>(&'a self, schema: &'a Schema) -> Result<&'a Schema> {
        match schema {
            Schema::Ref { name } => self
                .inner
                .names
                .get(name)
                .ok_or_else(|| CodecError::invalid(format!("reference to undefined type {}", name))),
            other => Ok(other),
        }
    }
}

/// Compute outside any lock, then publish; racing threads may each compute,
/// the first published value wins
fn publish_once<T>(slot: &OnceLock<T>, compute: impl FnOnce() -> T) -> &T {
    if let Some(value) = slot.get() {
        return value;
    }
    let value = compute();
    slot.get_or_init(|| value)
}

impl fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaEntry")
            .field("id", &self.inner.id)
            .field("canonical", &self.inner.canonical)
            .finish()
    }
}

impl TryFrom<Schema> for SchemaEntry {
    type Error = CodecError;

    fn try_from(schema: Schema) -> Result<Self> {
        Self::new(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linked_list() -> Schema {
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
        .into()
    }

    #[test]
    fn test_name_parsing() {
        let name = Name::new("familiar.message.TestRecord");
        assert_eq!(name.name, "TestRecord");
        assert_eq!(name.namespace.as_deref(), Some("familiar.message"));
        assert_eq!(name.fullname(), "familiar.message.TestRecord");

        let bare = Name::new("TestRecord");
        assert_eq!(bare.namespace, None);
        assert_eq!(Name::with_namespace("TestRecord", ""), bare);
    }

    #[test]
    fn test_alias_qualification() {
        let owner = Name::new("familiar.v2.User");
        assert_eq!(owner.qualify(&Name::new("Person")), Name::new("familiar.v2.Person"));
        assert_eq!(owner.qualify(&Name::new("legacy.Person")), Name::new("legacy.Person"));
    }

    #[test]
    fn test_recursive_schema_is_valid() {
        let entry = SchemaEntry::new(linked_list()).unwrap();
        let Schema::Record(record) = entry.schema() else { panic!("expected record") };
        let Schema::Union(union) = &record.fields[1].schema else { panic!("expected union") };
        let resolved = entry.resolve(&union.variants[1]).unwrap();
        assert_eq!(resolved.kind(), SchemaKind::Record);
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let schema = Schema::array(Schema::reference("familiar.Missing"));
        assert!(matches!(SchemaEntry::new(schema), Err(CodecError::InvalidSchema(_))));
    }

    #[test]
    fn test_union_duplicate_kind_rejected() {
        let schema = Schema::union(vec![Schema::String, Schema::Null, Schema::String]);
        assert!(SchemaEntry::new(schema).is_err());

        let arrays = Schema::union(vec![Schema::array(Schema::Int), Schema::array(Schema::Long)]);
        assert!(SchemaEntry::new(arrays).is_err());
    }

    #[test]
    fn test_union_distinct_named_branches_allowed() {
        let schema = Schema::union(vec![
            FixedSchema::new("familiar.Md5", 16).into(),
            FixedSchema::new("familiar.Sha1", 20).into(),
        ]);
        assert!(SchemaEntry::new(schema).is_ok());
    }

    #[test]
    fn test_nested_union_rejected() {
        let schema = Schema::union(vec![Schema::Null, Schema::union(vec![Schema::Int])]);
        assert!(SchemaEntry::new(schema).is_err());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let schema: Schema = RecordSchema::new(
            "familiar.Dup",
            vec![RecordField::new("a", Schema::Int), RecordField::new("a", Schema::Long)],
        )
        .into();
        assert!(SchemaEntry::new(schema).is_err());
    }

    #[test]
    fn test_enum_default_must_be_symbol() {
        let schema: Schema = EnumSchema::new("familiar.Suit", &["HEARTS", "SPADES"])
            .with_default("CLUBS")
            .into();
        assert!(SchemaEntry::new(schema).is_err());
    }

    #[test]
    fn test_entries_have_distinct_identity() {
        let a = SchemaEntry::new(Schema::Long).unwrap();
        let b = SchemaEntry::new(Schema::Long).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert!(a.same_form(&b));
        assert_eq!(a.rabin(), b.rabin());
    }

    #[test]
    fn test_serde_keeps_null_default() {
        let field = RecordField::new("nickname", Schema::union(vec![Schema::Null, Schema::String]))
            .with_default(json!(null));
        let text = serde_json::to_string(&field).unwrap();
        let back: RecordField = serde_json::from_str(&text).unwrap();
        assert_eq!(back.default, Some(serde_json::Value::Null));

        let bare: RecordField = serde_json::from_str(r#"{"name":"x","type":{"type":"int"}}"#).unwrap();
        assert_eq!(bare.default, None);
    }

    #[test]
    fn test_schema_serde_round_trip() {
        let schema = linked_list();
        let text = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&text).unwrap();
        assert_eq!(back, schema);
    }
}
