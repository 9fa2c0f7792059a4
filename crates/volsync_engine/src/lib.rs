//! # Volsync Engine
//!
//! One-way synchronization between a local directory and an object-store
//! prefix.
//!
//! This crate provides:
//! - Endpoint parsing (local path vs `scheme://bucket/prefix`)
//! - Snapshot enumeration of both sides, with path filters
//! - A size + mtime diff engine producing a copy/delete plan
//! - A bounded worker pool with fail-fast cancellation
//! - The [`Syncer`] orchestrator and its state machine
//!
//! ## Model
//!
//! Each call syncs in exactly one direction:
//! 1. Enumerate source and destination concurrently
//! 2. Diff the two snapshots
//! 3. Run copy and delete jobs, at most `concurrency` at a time
//!
//! ## Key Invariants
//!
//! - Exactly one endpoint is remote; anything else fails before I/O
//! - Deletion only happens when explicitly enabled
//! - The first failed job cancels every job not yet started
//! - Repeating a successful sync with no changes plans nothing

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod endpoint;
mod error;
mod filter;
mod plan;
mod pool;
mod snapshot;
mod state;
mod transfer;

pub use config::{SyncConfig, DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CAPACITY};
pub use endpoint::{Endpoint, RemoteLocation};
pub use error::{Side, SyncError, SyncResult};
pub use filter::Filter;
pub use plan::{needs_copy, SyncPlan};
pub use pool::{CancelToken, Job, JobKind, TransferStats, WorkerPool};
pub use snapshot::{enumerate_local, enumerate_remote, ObjectRecord, Snapshot};
pub use state::{Direction, PlannedSync, Route, SyncReport, SyncState, SyncStats, Syncer};
