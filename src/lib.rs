//! Familiar Message Codec
//!
//! Self-describing binary messages for schema-typed data. Each message
//! carries the fingerprint of the schema it was written with instead of the
//! schema text, so a receiver holding a compatible reader schema can decode
//! it even when the two schemas differ.
//!
//! ## Features
//!
//! - **Canonical Form**: Schemas reduce to a byte-stable canonical text
//! - **Fingerprints**: CRC-64-AVRO, MD5 and SHA-256 over the canonical form
//! - **Single-Object Framing**: `C3 01` marker, 8-byte fingerprint, payload
//! - **Schema Resolution**: Field additions, aliases, enum remaps and numeric
//!   promotions are reconciled through cached resolution plans
//! - **Schema Stores**: In-memory, directory-backed and fetch-through lookups
//!
//! ## Architecture
//!
//! ```text
//! Value ──► MessageEncoder ──► [C3 01 | fingerprint | payload]
//!                                          │
//!                                          ▼
//!                      MessageDecoder ──► SchemaStore (fingerprint → writer)
//!                             │
//!                             ▼
//!                      ResolutionPlan (writer × reader) ──► Value
//! ```

pub mod canonical;
pub mod codec;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod fingerprint;
pub mod message;
pub mod resolution;
pub mod schema;
pub mod store;
pub mod value;

pub use codec::Limits;
pub use config::CodecConfig;
pub use error::{CodecError, ErrorKind, Result};
pub use fingerprint::{Fingerprint, FingerprintAlgorithm};
pub use message::{MessageDecoder, MessageEncoder, MessageHeader};
pub use resolution::ResolutionPlan;
pub use schema::{EnumSchema, FixedSchema, Name, RecordField, RecordSchema, Schema, SchemaEntry, SchemaId};
pub use store::{FetchSchemaStore, FileSchemaStore, MemorySchemaStore, SchemaFetcher, SchemaStore};
pub use value::Value;
