//! Error types for the persistent cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache creation and writes.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A cache with this id is already registered
    #[error("Cache id '{0}' is already taken")]
    DuplicateId(String),

    /// Both `capacity` and `max_length` were supplied
    #[error("Cache '{0}': choose between capacity OR max_length")]
    ConflictingBounds(String),

    /// The codec failed to serialize a value
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// The cache has been torn down
    #[error("Cache '{0}' has been destroyed")]
    Destroyed(String),

    /// The storage backend rejected an operation outside of write recovery
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == Storage Error Enum ==
/// Failures reported by a [`Storage`](crate::storage::Storage) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Writing would exceed the storage quota (in characters)
    #[error("Storage quota exceeded: {needed} chars needed, quota is {quota}")]
    QuotaExceeded { needed: usize, quota: usize },

    /// The backing medium failed
    #[error("Storage I/O failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
