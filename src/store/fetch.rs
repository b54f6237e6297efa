//! Fetch-through schema store

use tracing::{debug, warn};

use crate::error::{CodecError, Result};
use crate::fingerprint::{Fingerprint, FingerprintAlgorithm};
use crate::schema::{Schema, SchemaEntry};
use crate::store::{MemorySchemaStore, SchemaStore};

/// Source of schemas not yet held locally, such as a registry client.
/// Timeouts and retries are the fetcher's business.
pub trait SchemaFetcher: Send + Sync {
    fn fetch(&self, fingerprint: &Fingerprint) -> Result<Option<Schema>>;
}

impl<F> SchemaFetcher for F
where
    F: Fn(&Fingerprint) -> Result<Option<Schema>> + Send + Sync,
{
    fn fetch(&self, fingerprint: &Fingerprint) -> Result<Option<Schema>> {
        self(fingerprint)
    }
}

/// Memory store that asks a fetcher on a miss and keeps what it gets
#[derive(Debug)]
pub struct FetchSchemaStore<F> {
    fetcher: F,
    cache: MemorySchemaStore,
}

impl<F: SchemaFetcher> FetchSchemaStore<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cache: MemorySchemaStore::with_algorithms(&[FingerprintAlgorithm::Md5, FingerprintAlgorithm::Sha256]),
        }
    }

    /// Schemas fetched or added so far
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl<F: SchemaFetcher> SchemaStore for FetchSchemaStore<F> {
    fn add(&self, entry: SchemaEntry) -> Result<Fingerprint> {
        self.cache.add(entry)
    }

    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<SchemaEntry>> {
        if let Some(entry) = self.cache.find(fingerprint)? {
            return Ok(Some(entry));
        }
        let Some(schema) = self.fetcher.fetch(fingerprint)? else {
            return Ok(None);
        };
        let entry = SchemaEntry::new(schema)?;
        let actual = entry.fingerprint(fingerprint.algorithm());
        if actual != *fingerprint {
            warn!(requested = %fingerprint, actual = %actual, "fetched schema has the wrong fingerprint");
            return Err(CodecError::StoreIntegrity(format!(
                "fetched schema for {} has fingerprint {}",
                fingerprint, actual
            )));
        }
        self.cache.add(entry.clone())?;
        debug!(fingerprint = %fingerprint, name = %entry.full_name(), "fetched schema");
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fetches_once_then_caches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let store = FetchSchemaStore::new(move |fp: &Fingerprint| -> Result<Option<Schema>> {
            counter.fetch_add(1, Ordering::SeqCst);
            let long = SchemaEntry::new(Schema::Long)?;
            Ok((long.fingerprint(fp.algorithm()) == *fp).then(|| Schema::Long))
        });

        let long = SchemaEntry::new(Schema::Long).unwrap();
        let fp = long.fingerprint(FingerprintAlgorithm::Rabin);
        assert!(store.find(&fp).unwrap().is_some());
        assert!(store.find(&fp).unwrap().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.cached(), 1);

        assert!(store.find(&Fingerprint::Rabin(1)).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wrong_schema_rejected() {
        let store = FetchSchemaStore::new(|_: &Fingerprint| -> Result<Option<Schema>> { Ok(Some(Schema::String)) });
        let err = store.find(&Fingerprint::Rabin(1)).unwrap_err();
        assert!(matches!(err, CodecError::StoreIntegrity(_)));
        assert_eq!(store.cached(), 0);
    }

    #[test]
    fn test_fetcher_errors_surface() {
        let store = FetchSchemaStore::new(|_: &Fingerprint| -> Result<Option<Schema>> {
            Err(CodecError::Store("registry unreachable".into()))
        });
        assert!(matches!(
            store.find(&Fingerprint::Rabin(1)),
            Err(CodecError::Store(_))
        ));
    }

    #[test]
    fn test_sha256_lookup() {
        let store = FetchSchemaStore::new(|_: &Fingerprint| -> Result<Option<Schema>> { Ok(Some(Schema::Int)) });
        let int = SchemaEntry::new(Schema::Int).unwrap();
        let fp = int.fingerprint(FingerprintAlgorithm::Sha256);
        let found = store.find(&fp).unwrap().unwrap();
        assert!(found.same_form(&int));
    }
}
