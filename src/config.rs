//! Configuration management for the message codec
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (codec.toml)
//! - Environment variables (FAMILIAR_CODEC__*)
//!
//! ## Example config file (codec.toml):
//! ```toml
//! [store]
//! backend = "file"
//! path = "./schema-store"
//!
//! [decoder]
//! plan_cache_limit = 1024
//! max_depth = 256
//! max_collection_items = 4194304
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::codec::{Limits, DEFAULT_MAX_COLLECTION_ITEMS, DEFAULT_MAX_DEPTH};
use crate::error::Result;
use crate::message::{MessageDecoder, MessageEncoder};
use crate::schema::SchemaEntry;
use crate::store::{FileSchemaStore, MemorySchemaStore, SchemaStore};

/// Main configuration for the codec
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Schema store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Decoder settings
    #[serde(default)]
    pub decoder: DecoderConfig,
}

/// Which schema store to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// Schema store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Root directory of a file store
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

/// Decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Maximum cached resolution plans; 0 is unbounded
    #[serde(default)]
    pub plan_cache_limit: usize,

    /// Deepest value nesting accepted by the decoder and encoder
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Array and map items accepted in one decoded value
    #[serde(default = "default_max_collection_items")]
    pub max_collection_items: usize,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("schema-store")
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_collection_items() -> usize {
    DEFAULT_MAX_COLLECTION_ITEMS
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            plan_cache_limit: 0,
            max_depth: default_max_depth(),
            max_collection_items: default_max_collection_items(),
        }
    }
}

impl DecoderConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_depth: self.max_depth,
            max_collection_items: self.max_collection_items,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

impl CodecConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["codec.toml", ".codec.toml", "config/codec.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "codec") {
            let xdg_config = config_dir.config_dir().join("codec.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // FAMILIAR_CODEC__STORE__BACKEND=file
        builder = builder.add_source(
            Environment::with_prefix("FAMILIAR_CODEC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the store path (resolves relative paths)
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            std::env::current_dir().unwrap_or_default().join(&self.store.path)
        }
    }

    /// Open the configured schema store
    pub fn open_store(&self) -> Result<Arc<dyn SchemaStore>> {
        let store: Arc<dyn SchemaStore> = match self.store.backend {
            StoreBackend::Memory => Arc::new(MemorySchemaStore::new()),
            StoreBackend::File => Arc::new(FileSchemaStore::open(self.store_path())?),
        };
        Ok(store)
    }

    /// Build a decoder for `reader` backed by `store`
    pub fn build_decoder(&self, reader: SchemaEntry, store: Arc<dyn SchemaStore>) -> MessageDecoder {
        MessageDecoder::new(reader)
            .with_store(store)
            .with_plan_cache_limit(self.decoder.plan_cache_limit)
            .with_limits(self.decoder.limits())
    }

    /// Build an encoder for `writer` with the configured depth bound
    pub fn build_encoder(&self, writer: SchemaEntry) -> MessageEncoder {
        MessageEncoder::new(writer).with_max_depth(self.decoder.max_depth)
    }
}
