//! Schema stores
//!
//! A [`SchemaStore`] maps fingerprints to schemas so a decoder can find the
//! writer schema named in a message header. Stores are append-only: once a
//! fingerprint is bound to a schema it stays bound, and binding it to a
//! schema with a different canonical form is a
//! [`FingerprintCollision`](crate::CodecError::FingerprintCollision).
//!
//! - [`MemorySchemaStore`]: process-local, concurrent
//! - [`FileSchemaStore`]: a directory of schema files plus a manifest
//! - [`FetchSchemaStore`]: fills misses from a [`SchemaFetcher`]

mod fetch;
mod file;
mod memory;

pub use fetch::{FetchSchemaStore, SchemaFetcher};
pub use file::{FileSchemaStore, ManifestEntry, StoreManifest};
pub use memory::MemorySchemaStore;

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::schema::SchemaEntry;

/// Fingerprint to schema lookup
pub trait SchemaStore: Send + Sync {
    /// Register a schema, returning its Rabin fingerprint. Adding a schema
    /// whose canonical form is already registered is a no-op.
    fn add(&self, entry: SchemaEntry) -> Result<Fingerprint>;

    /// Look up a schema. `Ok(None)` means the store has no such schema; an
    /// error means the store itself failed.
    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<SchemaEntry>>;
}
