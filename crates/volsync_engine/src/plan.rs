//! Diff engine: decides what to copy and what to delete.
//!
//! The comparison is a size + modification-time heuristic, not a content
//! hash. It never reads object content, at the price of trusting clocks
//! on both sides.

use crate::pool::Job;
use crate::snapshot::{ObjectRecord, Snapshot};

/// Paths to copy from source to destination, and paths to delete from the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Relative paths to transfer, in unspecified order.
    pub copies: Vec<String>,
    /// Relative paths to remove; always empty when deletion is disabled.
    pub deletes: Vec<String>,
}

impl SyncPlan {
    /// Compares two snapshots. Performs no I/O.
    ///
    /// A source path is copied when it is missing from the destination,
    /// when the sizes differ, or when the sizes match and the source is
    /// strictly newer. With `delete_enabled`, every destination path absent
    /// from the source is deleted.
    pub fn compute(source: &Snapshot, destination: &Snapshot, delete_enabled: bool) -> Self {
        let copies = source
            .iter()
            .filter(|record| needs_copy(record, destination.get(&record.relative_path)))
            .map(|record| record.relative_path.clone())
            .collect();

        let deletes = if delete_enabled {
            destination
                .iter()
                .filter(|record| !source.contains(&record.relative_path))
                .map(|record| record.relative_path.clone())
                .collect()
        } else {
            Vec::new()
        };

        Self { copies, deletes }
    }

    /// Total number of jobs.
    pub fn len(&self) -> usize {
        self.copies.len() + self.deletes.len()
    }

    /// Returns true if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty() && self.deletes.is_empty()
    }

    /// Yields every copy job, then every delete job.
    pub fn jobs(&self) -> impl Iterator<Item = Job> + '_ {
        self.copies
            .iter()
            .map(Job::copy)
            .chain(self.deletes.iter().map(Job::delete))
    }

    /// Sorts both lists, for stable display.
    pub fn sorted(mut self) -> Self {
        self.copies.sort();
        self.deletes.sort();
        self
    }
}

/// Decides whether `source` must be copied over `destination`.
pub fn needs_copy(source: &ObjectRecord, destination: Option<&ObjectRecord>) -> bool {
    match destination {
        None => true,
        Some(existing) if existing.size != source.size => true,
        Some(existing) => source.modified_at > existing.modified_at,
    }
}
