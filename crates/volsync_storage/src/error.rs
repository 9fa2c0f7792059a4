//! Error types for object store operations.

use std::io;
use thiserror::Error;

/// Result type for object store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The bucket does not exist.
    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    /// The object does not exist.
    #[error("no such key: {bucket}/{key}")]
    NoSuchKey {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },

    /// The key cannot be stored (empty, absolute, or escapes the bucket).
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    /// The bucket name cannot be used.
    #[error("invalid bucket name: {0:?}")]
    InvalidBucket(String),

    /// A listing continuation token did not come from this store.
    #[error("invalid continuation token: {0:?}")]
    InvalidContinuationToken(String),

    /// The backend reported a failure of its own.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a backend error from any message.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns true if this error means the object was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NoSuchKey { .. } => true,
            StoreError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
