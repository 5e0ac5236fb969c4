//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// The requested key does not exist (or its latest version is a
    /// tombstone).
    #[error("object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The store rejected a malformed object.
    #[error("invalid object {key}: {reason}")]
    InvalidObject {
        /// The offending key.
        key: String,
        /// Why the object was rejected.
        reason: String,
    },

    /// The store is unreachable or overloaded. Retryable.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Why the store is unavailable.
        reason: String,
    },
}

impl StoreError {
    /// True if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
