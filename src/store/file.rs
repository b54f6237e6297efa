//! Directory-backed schema store
//!
//! ```text
//! <root>/
//! ├── manifest.json
//! └── schemas/
//!     ├── ded8936da6fed3e2.json
//!     └── ...
//! ```
//!
//! Each schema file holds the serialized schema tree and is named after the
//! Rabin fingerprint of its canonical form. Files are written once and never
//! rewritten.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CodecError, Result};
use crate::fingerprint::{Fingerprint, FingerprintAlgorithm};
use crate::schema::{Schema, SchemaEntry};
use crate::store::{MemorySchemaStore, SchemaStore};

const MANIFEST_FILE: &str = "manifest.json";
const SCHEMAS_DIR: &str = "schemas";

/// Listing of every schema in the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreManifest {
    pub schemas: Vec<ManifestEntry>,
}

/// One registered schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Rabin fingerprint, hex
    pub fingerprint: String,
    /// Full name of the root type
    pub name: String,
    pub registered_at: DateTime<Utc>,
}

/// Persistent schema store rooted at a directory
#[derive(Debug)]
pub struct FileSchemaStore {
    root: PathBuf,
    index: MemorySchemaStore,
    manifest: Mutex<StoreManifest>,
}

impl FileSchemaStore {
    /// Open an existing store or create an empty one, verifying every stored
    /// schema against its file name
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        fs::create_dir_all(root.join(SCHEMAS_DIR))?;

        let manifest_path = root.join(MANIFEST_FILE);
        let manifest: StoreManifest = if manifest_path.exists() {
            serde_json::from_str(&fs::read_to_string(&manifest_path)?)?
        } else {
            StoreManifest::default()
        };

        let store = Self {
            root,
            index: MemorySchemaStore::new(),
            manifest: Mutex::new(manifest),
        };
        store.load_schemas()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot of the manifest
    pub fn manifest(&self) -> Result<StoreManifest> {
        Ok(self.lock_manifest()?.clone())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn schema_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(SCHEMAS_DIR).join(format!("{}.json", fingerprint.to_hex()))
    }

    fn lock_manifest(&self) -> Result<MutexGuard<'_, StoreManifest>> {
        self.manifest
            .lock()
            .map_err(|_| CodecError::Store("manifest lock poisoned".to_string()))
    }

    /// Load and verify every schema file, then check the manifest against them
    fn load_schemas(&self) -> Result<()> {
        for dir_entry in fs::read_dir(self.root.join(SCHEMAS_DIR))? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let schema: Schema = serde_json::from_str(&fs::read_to_string(&path)?)?;
            let entry = SchemaEntry::new(schema)?;
            let actual = entry.fingerprint(FingerprintAlgorithm::Rabin);
            if actual.to_hex() != stem {
                warn!(path = %path.display(), actual = %actual, "schema file does not match its fingerprint");
                return Err(CodecError::StoreIntegrity(format!(
                    "{} holds a schema with fingerprint {}",
                    path.display(),
                    actual
                )));
            }
            self.index.add(entry)?;
        }

        let manifest = self.lock_manifest()?;
        for listed in &manifest.schemas {
            let fingerprint = Fingerprint::from_hex(&listed.fingerprint)?;
            if self.index.find(&fingerprint)?.is_none() {
                warn!(fingerprint = %listed.fingerprint, name = %listed.name, "manifest entry without schema file");
                return Err(CodecError::StoreIntegrity(format!(
                    "manifest lists {} ({}) but its schema file is missing",
                    listed.fingerprint, listed.name
                )));
            }
        }
        info!(root = %self.root.display(), schemas = self.index.len(), "opened schema store");
        Ok(())
    }

    fn write_manifest(&self, manifest: &StoreManifest) -> Result<()> {
        let content = serde_json::to_string_pretty(manifest)?;
        fs::write(self.root.join(MANIFEST_FILE), content)?;
        Ok(())
    }
}

impl SchemaStore for FileSchemaStore {
    fn add(&self, entry: SchemaEntry) -> Result<Fingerprint> {
        let fingerprint = entry.fingerprint(FingerprintAlgorithm::Rabin);
        let mut manifest = self.lock_manifest()?;

        if self.index.find(&fingerprint)?.is_some() {
            // idempotent for the same form, collision otherwise
            return self.index.add(entry);
        }

        let path = self.schema_path(&fingerprint);
        let content = serde_json::to_string_pretty(entry.schema())?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                return Err(CodecError::StoreIntegrity(format!(
                    "{} exists but is not indexed",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes())?;

        self.index.add(entry.clone())?;
        manifest.schemas.push(ManifestEntry {
            fingerprint: fingerprint.to_hex(),
            name: entry.full_name(),
            registered_at: Utc::now(),
        });
        self.write_manifest(&manifest)?;
        debug!(fingerprint = %fingerprint, path = %path.display(), "persisted schema");
        Ok(fingerprint)
    }

    fn find(&self, fingerprint: &Fingerprint) -> Result<Option<SchemaEntry>> {
        self.index.find(fingerprint)
    }
}
