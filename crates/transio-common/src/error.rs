//! Error types for Transio
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for Transio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Transio
#[derive(Debug, Error)]
pub enum Error {
    // Capacity errors
    #[error("maximum transient space exceeded: {size} bytes used, limit {limit} bytes")]
    MaximumSpaceExceeded { size: u64, limit: u64 },

    // Coordination errors
    #[error("unable to acquire lock {key} after {waited_ms} ms")]
    LockTimeout { key: String, waited_ms: u64 },

    #[error("compare-and-set on {key} gave up after {attempts} attempts")]
    Contention { key: String, attempts: u32 },

    // Collaborator errors
    #[error("blob not found: {key}")]
    BlobNotFound { key: String },

    #[error("key/value store error: {0}")]
    KeyValue(String),

    #[error("blob provider error: {0}")]
    BlobProvider(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Encoding errors
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a key/value store error
    pub fn key_value(msg: impl Into<String>) -> Self {
        Self::KeyValue(msg.into())
    }

    /// Create a blob provider error
    pub fn blob_provider(msg: impl Into<String>) -> Self {
        Self::BlobProvider(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this is a retryable error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::Contention { .. })
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::BlobNotFound { .. } | Self::UnknownProvider(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::Deserialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(
            Error::LockTimeout {
                key: "k.bloblock".into(),
                waited_ms: 5000
            }
            .is_retryable()
        );
        assert!(
            Error::Contention {
                key: "k".into(),
                attempts: 3
            }
            .is_retryable()
        );
        assert!(
            !Error::MaximumSpaceExceeded {
                size: 10,
                limit: 5
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::BlobNotFound { key: "abc".into() }.is_not_found());
        assert!(!Error::internal("boom").is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::MaximumSpaceExceeded {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "maximum transient space exceeded: 2048 bytes used, limit 1024 bytes"
        );
    }
}
