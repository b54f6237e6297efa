//! Single-object message framing
//!
//! A message is the two-byte marker `0xC3 0x01`, the writer schema's 64-bit
//! Rabin fingerprint in little-endian order, then the binary payload:
//!
//! ```text
//! offset  size  content
//! 0       1     0xC3
//! 1       1     0x01
//! 2       8     CRC-64-AVRO fingerprint, little-endian
//! 10      n     payload
//! ```
//!
//! [`MessageEncoder`] frames values under one writer schema.
//! [`MessageDecoder`] looks the writer schema up by fingerprint and decodes
//! either directly or through a cached [`ResolutionPlan`].

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::codec::{Limits, Reader, DEFAULT_MAX_DEPTH};
use crate::decode::{decode_value, expect_end};
use crate::encode::encode_value_within;
use crate::error::{CodecError, Result};
use crate::fingerprint::Fingerprint;
use crate::resolution::ResolutionPlan;
use crate::schema::{SchemaEntry, SchemaId};
use crate::store::SchemaStore;
use crate::value::Value;

/// Two-byte marker opening every message
pub const MARKER: [u8; 2] = [0xC3, 0x01];

/// Marker plus fingerprint
pub const HEADER_LEN: usize = 10;

// =============================================================================
// Header
// =============================================================================

/// Parsed message header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHeader {
    pub fingerprint: u64,
}

impl MessageHeader {
    /// Parse the header at the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() >= MARKER.len() && bytes[..MARKER.len()] != MARKER {
            return Err(CodecError::malformed(format!(
                "expected marker c3 01, found {:02x} {:02x}",
                bytes[0], bytes[1]
            )));
        }
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::malformed(format!(
                "message of {} bytes is shorter than the {}-byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }
        let mut fingerprint = [0u8; 8];
        fingerprint.copy_from_slice(&bytes[MARKER.len()..HEADER_LEN]);
        Ok(Self {
            fingerprint: u64::from_le_bytes(fingerprint),
        })
    }

    /// Header bytes for this fingerprint
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..MARKER.len()].copy_from_slice(&MARKER);
        out[MARKER.len()..].copy_from_slice(&self.fingerprint.to_le_bytes());
        out
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Rabin(self.fingerprint)
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c301 {:016x}", self.fingerprint)
    }
}

/// Whether `bytes` starts with the message marker
pub fn has_marker(bytes: &[u8]) -> bool {
    bytes.starts_with(&MARKER)
}

// =============================================================================
// Encoder
// =============================================================================

/// Frames values written under a single schema
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    schema: SchemaEntry,
    header: [u8; HEADER_LEN],
    max_depth: usize,
}

impl MessageEncoder {
    pub fn new(schema: SchemaEntry) -> Self {
        let header = MessageHeader {
            fingerprint: schema.rabin(),
        }
        .to_bytes();
        Self {
            schema,
            header,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Refuse values nested deeper than `max_depth`
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Encode one value into a new message
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_into(value, &mut out)?;
        Ok(out)
    }

    /// Append one message to `out`; on error `out` is left as it was
    pub fn encode_into(&self, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        out.extend_from_slice(&self.header);
        if let Err(e) = encode_value_within(value, &self.schema, self.max_depth, out) {
            out.truncate(start);
            return Err(e);
        }
        Ok(())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::Rabin(self.schema.rabin())
    }

    pub fn schema(&self) -> &SchemaEntry {
        &self.schema
    }
}

// =============================================================================
// Decoder
// =============================================================================

type PlanKey = (u64, SchemaId);

/// Decodes messages into values shaped by a reader schema
pub struct MessageDecoder {
    reader: SchemaEntry,
    store: Option<Arc<dyn SchemaStore>>,
    known: DashMap<u64, SchemaEntry>,
    plans: DashMap<PlanKey, Arc<ResolutionPlan>>,
    plan_cache_limit: usize,
    limits: Limits,
}

impl MessageDecoder {
    pub fn new(reader: SchemaEntry) -> Self {
        Self {
            reader,
            store: None,
            known: DashMap::new(),
            plans: DashMap::new(),
            plan_cache_limit: 0,
            limits: Limits::default(),
        }
    }

    /// Builder form of [`MessageDecoder::attach_store`]
    pub fn with_store(mut self, store: Arc<dyn SchemaStore>) -> Self {
        self.attach_store(store);
        self
    }

    /// Look up writer schemas in `store`
    pub fn attach_store(&mut self, store: Arc<dyn SchemaStore>) {
        self.store = Some(store);
    }

    /// Bound the plan cache; 0 means unbounded
    pub fn with_plan_cache_limit(mut self, limit: usize) -> Self {
        self.plan_cache_limit = limit;
        self
    }

    /// Bound nesting depth and collection sizes of decoded values
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Make a writer schema known to this decoder without a store
    pub fn add_schema(&self, entry: SchemaEntry) -> Result<()> {
        match self.known.entry(entry.rabin()) {
            Entry::Occupied(existing) => {
                if existing.get().same_form(&entry) {
                    Ok(())
                } else {
                    Err(CodecError::FingerprintCollision {
                        fingerprint: Fingerprint::Rabin(entry.rabin()),
                        existing: existing.get().full_name(),
                        attempted: entry.full_name(),
                    })
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    pub fn reader(&self) -> &SchemaEntry {
        &self.reader
    }

    /// Decode a message with this decoder's reader schema
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        self.decode_as(bytes, &self.reader)
    }

    /// Decode a message with a different reader schema
    ///
    /// Plans are cached per reader entry identity, not per schema text, so
    /// each distinct `SchemaEntry` passed here keeps its own cache slots.
    /// Reuse reader entries across calls, or bound the cache with
    /// [`MessageDecoder::with_plan_cache_limit`].
    pub fn decode_with_reader(&self, bytes: &[u8], reader: &SchemaEntry) -> Result<Value> {
        self.decode_as(bytes, reader)
    }

    fn decode_as(&self, bytes: &[u8], reader: &SchemaEntry) -> Result<Value> {
        let header = MessageHeader::parse(bytes)?;
        let mut cursor = Reader::with_limits(&bytes[HEADER_LEN..], self.limits);

        let value = if header.fingerprint == reader.rabin() {
            decode_value(&mut cursor, reader)?
        } else {
            let writer = self.writer_schema(header.fingerprint)?;
            if writer.same_form(reader) {
                decode_value(&mut cursor, reader)?
            } else {
                self.plan(&writer, reader)?.read(&mut cursor)?
            }
        };
        expect_end(&cursor)?;
        Ok(value)
    }

    /// Find the writer schema for a header fingerprint
    pub fn writer_schema(&self, fingerprint: u64) -> Result<SchemaEntry> {
        if fingerprint == self.reader.rabin() {
            return Ok(self.reader.clone());
        }
        if let Some(entry) = self.known.get(&fingerprint) {
            return Ok(entry.value().clone());
        }
        let fingerprint = Fingerprint::Rabin(fingerprint);
        match &self.store {
            Some(store) => store
                .find(&fingerprint)?
                .ok_or(CodecError::MissingSchema { fingerprint }),
            None => Err(CodecError::MissingSchema { fingerprint }),
        }
    }

    fn plan(&self, writer: &SchemaEntry, reader: &SchemaEntry) -> Result<Arc<ResolutionPlan>> {
        let key = (writer.rabin(), reader.id());
        let cached = self.plans.get(&key).map(|plan| Arc::clone(plan.value()));
        if let Some(plan) = cached {
            trace!(writer = %format!("{:016x}", key.0), reader_id = key.1.get(), "resolution plan cache hit");
            return Ok(plan);
        }

        let plan = Arc::new(ResolutionPlan::build(writer, reader)?);
        if self.plan_cache_limit > 0 && self.plans.len() >= self.plan_cache_limit {
            debug!(limit = self.plan_cache_limit, "plan cache full, clearing");
            self.plans.clear();
        }
        self.plans.insert(key, Arc::clone(&plan));
        Ok(plan)
    }

    /// Drop every cached resolution plan
    pub fn clear_plan_cache(&self) {
        self.plans.clear();
    }

    /// Number of cached resolution plans
    pub fn cached_plans(&self) -> usize {
        self.plans.len()
    }
}

impl fmt::Debug for MessageDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDecoder")
            .field("reader", &self.reader)
            .field("has_store", &self.store.is_some())
            .field("known", &self.known.len())
            .field("cached_plans", &self.plans.len())
            .field("limits", &self.limits)
            .finish()
    }
}
