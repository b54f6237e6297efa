//! Error types for the message codec

use thiserror::Error;

use crate::fingerprint::Fingerprint;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Header marker mismatch, short header, or a payload that does not match
    /// the shape demanded by the writer schema
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Missing schema: no schema registered for fingerprint {fingerprint}")]
    MissingSchema { fingerprint: Fingerprint },

    /// Writer and reader schema cannot be reconciled
    #[error("Incompatible schema: {0}")]
    IncompatibleSchema(String),

    /// The value does not conform to the schema used to encode it
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Fingerprint collision on {fingerprint}: bound to {existing}, refusing to rebind to {attempted}")]
    FingerprintCollision {
        fingerprint: Fingerprint,
        existing: String,
        attempted: String,
    },

    #[error("Store integrity violation: {0}")]
    StoreIntegrity(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Inspectable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedMessage,
    MissingSchema,
    IncompatibleSchema,
    Encoding,
    InvalidSchema,
    Store,
}

impl CodecError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        CodecError::MalformedMessage(msg.into())
    }

    pub(crate) fn incompatible(msg: impl Into<String>) -> Self {
        CodecError::IncompatibleSchema(msg.into())
    }

    pub(crate) fn encoding(msg: impl Into<String>) -> Self {
        CodecError::Encoding(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CodecError::InvalidSchema(msg.into())
    }

    /// Get the category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::MalformedMessage(_) => ErrorKind::MalformedMessage,
            CodecError::MissingSchema { .. } => ErrorKind::MissingSchema,
            CodecError::IncompatibleSchema(_) => ErrorKind::IncompatibleSchema,
            CodecError::Encoding(_) => ErrorKind::Encoding,
            CodecError::InvalidSchema(_) => ErrorKind::InvalidSchema,
            CodecError::FingerprintCollision { .. }
            | CodecError::StoreIntegrity(_)
            | CodecError::Store(_)
            | CodecError::Io(_)
            | CodecError::Json(_) => ErrorKind::Store,
        }
    }

    /// Whether the caller can recover by changing state outside the message
    /// (registering the writer schema) and decoding again
    pub fn is_retryable(&self) -> bool {
        matches!(self, CodecError::MissingSchema { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_schema_is_retryable() {
        let missing = CodecError::MissingSchema {
            fingerprint: Fingerprint::Rabin(7),
        };
        assert!(missing.is_retryable());
        assert_eq!(missing.kind(), ErrorKind::MissingSchema);

        assert!(!CodecError::malformed("bad marker").is_retryable());
        assert!(!CodecError::incompatible("no default").is_retryable());
        assert!(!CodecError::encoding("bad union").is_retryable());
    }

    #[test]
    fn test_display_includes_fingerprint() {
        let err = CodecError::MissingSchema {
            fingerprint: Fingerprint::Rabin(0x63dd24e7cc258f8a),
        };
        assert!(err.to_string().contains("63dd24e7cc258f8a"));
    }
}
