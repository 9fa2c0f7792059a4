//! Sync orchestrator and its state machine.

use crate::config::SyncConfig;
use crate::endpoint::{Endpoint, RemoteLocation};
use crate::error::{Side, SyncError, SyncResult};
use crate::plan::SyncPlan;
use crate::pool::{CancelToken, WorkerPool};
use crate::snapshot::{enumerate_local, enumerate_remote, Snapshot};
use crate::transfer::{Download, Upload};
use parking_lot::RwLock;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use volsync_storage::{ObjectStore, StoreError, StoreResult};

/// The current state of a sync invocation.
///
/// `Idle → Enumerating → Diffing → Transferring → Done | Failed`.
/// Any failure is terminal for that invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync has run yet.
    Idle,
    /// Listing both endpoints.
    Enumerating,
    /// Comparing snapshots.
    Diffing,
    /// Running copy and delete jobs.
    Transferring,
    /// The last sync succeeded.
    Done,
    /// The last sync failed.
    Failed,
}

impl SyncState {
    /// Returns true while a sync is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Enumerating | SyncState::Diffing | SyncState::Transferring
        )
    }

    /// Returns true if a new sync can start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Which way data flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Remote objects are copied into the local directory.
    Download,
    /// Local files are copied into the remote prefix.
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Download => f.write_str("remote -> local"),
            Direction::Upload => f.write_str("local -> remote"),
        }
    }
}

/// A resolved pair of endpoints: one local directory and one remote location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Which way data flows.
    pub direction: Direction,
    /// The local side.
    pub local: PathBuf,
    /// The remote side.
    pub remote: RemoteLocation,
}

impl Route {
    /// Classifies two endpoint strings. Performs no I/O.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidEndpoint`] if either string does not parse
    /// - [`SyncError::UnsupportedMode`] unless exactly one side is remote
    pub fn resolve(source: &str, destination: &str) -> SyncResult<Self> {
        match (Endpoint::parse(source)?, Endpoint::parse(destination)?) {
            (Endpoint::Remote(remote), Endpoint::Local(local)) => Ok(Self {
                direction: Direction::Download,
                local,
                remote,
            }),
            (Endpoint::Local(local), Endpoint::Remote(remote)) => Ok(Self {
                direction: Direction::Upload,
                local,
                remote,
            }),
            _ => Err(SyncError::UnsupportedMode {
                from: source.to_string(),
                to: destination.to_string(),
            }),
        }
    }

    fn label(&self, side: Side) -> String {
        match (self.direction, side) {
            (Direction::Download, Side::Source) | (Direction::Upload, Side::Destination) => {
                self.remote.to_string()
            }
            _ => self.local.display().to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.label(Side::Source),
            self.label(Side::Destination)
        )
    }
}

/// Outcome of one successful sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Which way data flowed.
    pub direction: Direction,
    /// Number of planned jobs.
    pub planned: usize,
    /// Objects copied to the destination.
    pub copied: u64,
    /// Objects deleted from the destination.
    pub deleted: u64,
    /// Bytes copied.
    pub bytes_transferred: u64,
    /// Wall-clock time of the whole invocation.
    pub duration: Duration,
}

/// A computed plan that has not been executed.
#[derive(Debug, Clone)]
pub struct PlannedSync {
    /// The resolved endpoints.
    pub route: Route,
    /// What a sync would do.
    pub plan: SyncPlan,
    /// Entries found on the source side.
    pub source_entries: usize,
    /// Entries found on the destination side.
    pub destination_entries: usize,
}

/// Cumulative statistics across sync invocations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Invocations that succeeded.
    pub runs_completed: u64,
    /// Invocations that failed.
    pub runs_failed: u64,
    /// Total objects copied.
    pub objects_copied: u64,
    /// Total objects deleted.
    pub objects_deleted: u64,
    /// Total bytes copied.
    pub bytes_transferred: u64,
    /// Completion time of the last successful sync.
    pub last_sync_time: Option<Instant>,
    /// Message of the last failure, cleared on success.
    pub last_error: Option<String>,
}

/// Keeps a local directory and a remote prefix in sync, one direction per call.
///
/// # Example
///
/// ```rust
/// use volsync_engine::{SyncConfig, Syncer};
/// use volsync_storage::InMemoryStore;
///
/// let store = InMemoryStore::new();
/// store.insert("bucket", "a.txt", b"hello world!".to_vec(), std::time::SystemTime::now());
///
/// let dir = tempfile::tempdir().unwrap();
/// let syncer = Syncer::new(SyncConfig::new(), store).unwrap();
/// let report = syncer.sync("mem://bucket", dir.path().to_str().unwrap()).unwrap();
///
/// assert_eq!(report.copied, 1);
/// assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello world!");
/// ```
pub struct Syncer<S: ObjectStore> {
    config: SyncConfig,
    store: S,
    pool: WorkerPool,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<S: ObjectStore> Syncer<S> {
    /// Creates a syncer over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the configuration is out of range.
    pub fn new(config: SyncConfig, store: S) -> SyncResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.concurrency, config.queue_capacity)?;
        Ok(Self {
            config,
            store,
            pool,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Syncs `source` into `destination`.
    ///
    /// Exactly one endpoint must be a `scheme://bucket[/prefix]` URI and
    /// the other a local directory.
    ///
    /// # Errors
    ///
    /// Returns the first error of whichever phase failed. No retry is
    /// attempted; calling again later starts from scratch.
    pub fn sync(&self, source: &str, destination: &str) -> SyncResult<SyncReport> {
        self.sync_with_cancel(source, destination, &CancelToken::new())
    }

    /// Like [`Syncer::sync`], stopping early once `cancel` fires.
    ///
    /// Jobs already running when cancellation is observed finish; partially
    /// written files or objects are not cleaned up.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] if cancelled before all jobs ran.
    pub fn sync_with_cancel(
        &self,
        source: &str,
        destination: &str,
        cancel: &CancelToken,
    ) -> SyncResult<SyncReport> {
        let start = Instant::now();
        self.begin()?;

        match self.run(source, destination, cancel, start) {
            Ok(report) => {
                self.set_state(SyncState::Done);
                let mut stats = self.stats.write();
                stats.runs_completed += 1;
                stats.objects_copied += report.copied;
                stats.objects_deleted += report.deleted;
                stats.bytes_transferred += report.bytes_transferred;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                Ok(report)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    /// Computes what a sync would do, without transferring anything.
    ///
    /// # Errors
    ///
    /// Returns configuration or enumeration errors.
    pub fn plan(&self, source: &str, destination: &str) -> SyncResult<PlannedSync> {
        let route = Route::resolve(source, destination)?;
        let (source_snapshot, destination_snapshot) = self.snapshots(&route)?;
        let plan = SyncPlan::compute(
            &source_snapshot,
            &destination_snapshot,
            self.config.delete_destination,
        );
        Ok(PlannedSync {
            route,
            plan,
            source_entries: source_snapshot.len(),
            destination_entries: destination_snapshot.len(),
        })
    }

    fn run(
        &self,
        source: &str,
        destination: &str,
        cancel: &CancelToken,
        start: Instant,
    ) -> SyncResult<SyncReport> {
        let route = Route::resolve(source, destination)?;
        info!(route = %route, direction = %route.direction, "starting sync");

        if route.direction == Direction::Download {
            fs::create_dir_all(&route.local).map_err(|e| SyncError::Enumerate {
                side: Side::Destination,
                endpoint: route.local.display().to_string(),
                source: e.into(),
            })?;
        }
        let (source_snapshot, destination_snapshot) = self.snapshots(&route)?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.set_state(SyncState::Diffing);
        let plan = SyncPlan::compute(
            &source_snapshot,
            &destination_snapshot,
            self.config.delete_destination,
        );
        info!(
            copies = plan.copies.len(),
            deletes = plan.deletes.len(),
            source_entries = source_snapshot.len(),
            destination_entries = destination_snapshot.len(),
            "computed sync plan"
        );

        self.set_state(SyncState::Transferring);
        let transferred = match route.direction {
            Direction::Download => {
                let download = Download {
                    store: &self.store,
                    location: &route.remote,
                    root: &route.local,
                    source: &source_snapshot,
                };
                self.pool.execute(
                    &plan,
                    |path| download.copy(path),
                    |path| download.delete(path),
                    cancel,
                )?
            }
            Direction::Upload => {
                let upload = Upload {
                    store: &self.store,
                    location: &route.remote,
                    root: &route.local,
                };
                self.pool.execute(
                    &plan,
                    |path| upload.copy(path),
                    |path| upload.delete(path),
                    cancel,
                )?
            }
        };

        let report = SyncReport {
            direction: route.direction,
            planned: plan.len(),
            copied: transferred.copied,
            deleted: transferred.deleted,
            bytes_transferred: transferred.bytes,
            duration: start.elapsed(),
        };
        info!(
            route = %route,
            copied = report.copied,
            deleted = report.deleted,
            bytes = report.bytes_transferred,
            elapsed_ms = report.duration.as_millis() as u64,
            "sync completed"
        );
        Ok(report)
    }

    /// Lists both sides concurrently; returns (source, destination).
    fn snapshots(&self, route: &Route) -> SyncResult<(Snapshot, Snapshot)> {
        let filter = &self.config.filter;

        let (remote, local) = thread::scope(|scope| {
            let remote = scope.spawn(|| enumerate_remote(&self.store, &route.remote, filter));
            let local = enumerate_local(&route.local, filter);
            let remote: StoreResult<Snapshot> = remote
                .join()
                .unwrap_or_else(|_| Err(StoreError::backend("remote enumeration panicked")));
            (remote, local)
        });

        let (remote_side, local_side) = match route.direction {
            Direction::Download => (Side::Source, Side::Destination),
            Direction::Upload => (Side::Destination, Side::Source),
        };
        let remote = remote.map_err(|source| SyncError::Enumerate {
            side: remote_side,
            endpoint: route.remote.to_string(),
            source,
        })?;
        let local = local.map_err(|source| SyncError::Enumerate {
            side: local_side,
            endpoint: route.local.display().to_string(),
            source,
        })?;

        Ok(match route.direction {
            Direction::Download => (remote, local),
            Direction::Upload => (local, remote),
        })
    }

    /// Moves from a resting state to `Enumerating`, or refuses.
    fn begin(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *state),
                to: format!("{:?}", SyncState::Enumerating),
            });
        }
        *state = SyncState::Enumerating;
        Ok(())
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn handle_error(&self, err: &SyncError) {
        error!(error = %err, "sync failed");
        self.set_state(SyncState::Failed);
        let mut stats = self.stats.write();
        stats.runs_failed += 1;
        stats.last_error = Some(err.to_string());
    }
}
