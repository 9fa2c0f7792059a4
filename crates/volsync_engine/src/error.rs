//! Error types for the sync engine.

use crate::pool::JobKind;
use std::fmt;
use thiserror::Error;
use volsync_storage::StoreError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Which side of a sync an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The side being copied from.
    Source,
    /// The side being copied to.
    Destination,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Destination => f.write_str("destination"),
        }
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Both endpoints are local, or both are remote.
    #[error("unsupported sync mode: {from} -> {to} (exactly one side must be remote)")]
    UnsupportedMode {
        /// Source endpoint as given.
        from: String,
        /// Destination endpoint as given.
        to: String,
    },

    /// An endpoint string could not be parsed.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// Endpoint as given.
        endpoint: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Engine configuration is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Listing one side failed; no transfer was started.
    #[error("failed to enumerate {side} {endpoint}: {source}")]
    Enumerate {
        /// Side that failed.
        side: Side,
        /// Endpoint being listed.
        endpoint: String,
        /// Underlying failure.
        #[source]
        source: StoreError,
    },

    /// A copy or delete job failed; remaining jobs were cancelled.
    #[error("failed to {operation} {path:?}: {source}")]
    Transfer {
        /// Kind of job that failed.
        operation: JobKind,
        /// Relative path of the job.
        path: String,
        /// Underlying failure.
        #[source]
        source: StoreError,
    },

    /// Sync was cancelled from outside before it finished.
    #[error("sync cancelled")]
    Cancelled,

    /// A sync is already running on this engine.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Object store error outside of enumeration or transfer.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem error outside of enumeration or transfer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this is a configuration error, detected before any I/O.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::UnsupportedMode { .. }
                | SyncError::InvalidEndpoint { .. }
                | SyncError::InvalidConfig(_)
        )
    }

    /// Returns true if running the same sync again later may succeed.
    pub fn is_retryable(&self) -> bool {
        !self.is_config_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_not_retryable() {
        let err = SyncError::UnsupportedMode {
            from: "/a".into(),
            to: "/b".into(),
        };
        assert!(err.is_config_error());
        assert!(!err.is_retryable());
        assert!(!SyncError::InvalidConfig("concurrency".into()).is_retryable());
        assert!(!SyncError::invalid_endpoint("s3://", "missing bucket").is_retryable());
    }

    #[test]
    fn runtime_errors_are_retryable() {
        assert!(SyncError::Cancelled.is_retryable());
        let err = SyncError::Transfer {
            operation: JobKind::Copy,
            path: "a.txt".into(),
            source: StoreError::backend("timeout"),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::UnsupportedMode {
            from: "s3://a".into(),
            to: "s3://b".into(),
        };
        assert_eq!(
            err.to_string(),
            "unsupported sync mode: s3://a -> s3://b (exactly one side must be remote)"
        );

        let err = SyncError::Transfer {
            operation: JobKind::Delete,
            path: "old.txt".into(),
            source: StoreError::backend("denied"),
        };
        assert_eq!(err.to_string(), "failed to delete \"old.txt\": backend error: denied");

        let err = SyncError::Enumerate {
            side: Side::Destination,
            endpoint: "/data".into(),
            source: StoreError::backend("unreadable"),
        };
        assert!(err.to_string().starts_with("failed to enumerate destination /data"));
    }
}
