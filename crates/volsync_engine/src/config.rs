//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use crate::filter::Filter;

/// Default number of concurrent transfer workers.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Default capacity of the job queue between planner and workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of transfer workers running at once.
    pub concurrency: usize,
    /// Whether destination entries missing from the source are deleted.
    pub delete_destination: bool,
    /// Paths excluded from both snapshots.
    pub filter: Filter,
    /// Capacity of the bounded job queue.
    pub queue_capacity: usize,
}

impl SyncConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            delete_destination: false,
            filter: Filter::all(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Sets the number of transfer workers.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Enables or disables deletion on the destination.
    pub fn with_delete(mut self, delete_destination: bool) -> Self {
        self.delete_destination = delete_destination;
        self
    }

    /// Sets the path filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the job queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Checks that all settings are in range.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if concurrency or queue capacity is zero.
    pub fn validate(&self) -> SyncResult<()> {
        if self.concurrency == 0 {
            return Err(SyncError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
