//! In-memory schema store

use std::sync::Mutex;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{CodecError, Result};
use crate::fingerprint::{Fingerprint, FingerprintAlgorithm};
use crate::schema::SchemaEntry;
use crate::store::SchemaStore;

/// Concurrent fingerprint index over schema entries
///
/// Every schema is indexed by its Rabin fingerprint, and optionally by
/// additional algorithms chosen at construction. Lookups never block;
/// registrations are serialized so a schema is bound under all of its
/// fingerprints or none of them.
#[derive(Debug)]
pub struct MemorySchemaStore {
    algorithms: Vec<FingerprintAlgorithm>,
    entries: DashMap<Fingerprint, SchemaEntry>,
    writes: Mutex<()>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::with_algorithms(&[])
    }

    /// Also index schemas under the given algorithms
    pub fn with_algorithms(extra: &[FingerprintAlgorithm]) -> Self {
        let mut algorithms = vec![FingerprintAlgorithm::Rabin];
        for algorithm in extra {
            if !algorithms.contains(algorithm) {
                algorithms.push(*algorithm);
            }
        }
        Self {
            algorithms,
            entries: DashMap::new(),
            writes: Mutex::new(()),
        }
    }

    pub fn algorithms(&self) -> &[FingerprintAlgorithm] {
        &self.algorithms
    }

    /// Number of distinct schemas
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key().algorithm() == FingerprintAlgorithm::Rabin)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered schemas, ordered by Rabin fingerprint
    pub fn entries(&self) -> Vec<SchemaEntry> {
        let mut entries: Vec<(Fingerprint, SchemaEntry)> = self
            .entries
            .iter()
            .filter(|e| e.key().algorithm() == FingerprintAlgorithm::Rabin)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Fail if `fingerprint` is already bound to a different schema;
    /// `Ok(true)` when the slot is free
    fn check(&self, fingerprint: &Fingerprint, entry: &SchemaEntry) -> Result<bool> {
        let Some(existing) = self.entries.get(fingerprint) else {
            return Ok(true);
        };
        if existing.same_form(entry) {
            return Ok(false);
        }
        warn!(
            fingerprint = %fingerprint,
            existing = %existing.full_name(),
            attempted = %entry.full_name(),
            "fingerprint collision"
        );
        Err(CodecError::FingerprintCollision {
            fingerprint: fingerprint.clone(),
            existing: existing.canonical_form().to_string(),
            attempted: entry.canonical_form().to_string(),
        })
    }
}

impl Default for MemorySchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaStore for MemorySchemaStore {
    fn add(&self, entry: SchemaEntry) -> Result<Fingerprint> {
        let _guard = self
            .writes
            .lock()
            .map_err(|_| CodecError::Store("schema store write lock poisoned".to_string()))?;

        let mut vacant = Vec::with_capacity(self.algorithms.len());
        for algorithm in &self.algorithms {
            let fingerprint = entry.fingerprint(*algorithm);
            if self.check(&fingerprint, &entry)? {
                vacant.push(fingerprint);
            }
        }

        let rabin = entry.fingerprint(FingerprintAlgorithm::Rabin);
        if vacant.contains(&rabin) {
            debug!(fingerprint = %rabin, name = %entry.full_name(), "registered schema");
        }
        for fingerprint in vacant {
            self.entries.insert(fingerprint, entry.clone());
        }
        Ok(rabin)
    }

    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<SchemaEntry>> {
        Ok(self.entries.get(fingerprint).map(|e| e.value().clone()))
    }
}
