//! Bounded worker pool that executes copy and delete jobs.
//!
//! The producer pushes every copy job, then every delete job, into a
//! bounded queue. A fixed number of workers drain it. The first failing
//! job records its error and cancels the run: workers stop dequeuing,
//! the producer stops enqueuing, and jobs already running finish on
//! their own. Only that first error is reported.

use crate::error::{SyncError, SyncResult};
use crate::plan::SyncPlan;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, warn};
use volsync_storage::StoreResult;

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Copy the path from source to destination.
    Copy,
    /// Delete the path from the destination.
    Delete,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Copy => f.write_str("copy"),
            JobKind::Delete => f.write_str("delete"),
        }
    }
}

/// One unit of transfer work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Relative path the job operates on.
    pub relative_path: String,
    /// What to do with it.
    pub kind: JobKind,
}

impl Job {
    /// Creates a copy job.
    pub fn copy(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            kind: JobKind::Copy,
        }
    }

    /// Creates a delete job.
    pub fn delete(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            kind: JobKind::Delete,
        }
    }
}

struct CancelInner {
    cancelled: AtomicBool,
    // Dropped on cancel; receivers then wake up disconnected.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
    children: Mutex<Vec<Weak<CancelInner>>>,
}

impl CancelInner {
    fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
            signal,
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.trigger.lock().take();
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// A cooperative cancellation signal shared between threads.
///
/// Cancelling is idempotent and wakes every thread blocked on
/// [`CancelToken::signal`]. A child token is cancelled whenever its parent
/// is, but cancelling the child leaves the parent untouched.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner::new()),
        }
    }

    /// Creates a token that follows this one's cancellation.
    pub fn child(&self) -> Self {
        let child = CancelToken::new();
        {
            let mut children = self.inner.children.lock();
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // Parent may have been cancelled before registration was visible.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancels this token and all of its children.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// A channel that becomes ready (disconnected) when the token is cancelled.
    ///
    /// Meant for `select!` alongside other channel operations.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Counters from one pool execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Copy jobs that completed.
    pub copied: u64,
    /// Delete jobs that completed.
    pub deleted: u64,
    /// Bytes moved by copy jobs.
    pub bytes: u64,
}

impl TransferStats {
    /// Total completed jobs.
    pub fn completed(&self) -> u64 {
        self.copied + self.deleted
    }
}

/// A fixed-size pool of transfer workers fed through a bounded queue.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    /// Creates a pool.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if either size is zero.
    pub fn new(concurrency: usize, queue_capacity: usize) -> SyncResult<Self> {
        if concurrency == 0 {
            return Err(SyncError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        if queue_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "queue capacity must be at least 1".into(),
            ));
        }
        Ok(Self {
            concurrency,
            queue_capacity,
        })
    }

    /// Returns the number of workers.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every job of `plan`, copies first, then deletes.
    ///
    /// `copy` and `delete` are called with the relative path and return the
    /// number of bytes moved. All workers have exited when this returns.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Transfer`] for the first job that failed
    /// - [`SyncError::Cancelled`] if `cancel` fired before every job ran
    pub fn execute<C, D>(
        &self,
        plan: &SyncPlan,
        copy: C,
        delete: D,
        cancel: &CancelToken,
    ) -> SyncResult<TransferStats>
    where
        C: Fn(&str) -> StoreResult<u64> + Sync,
        D: Fn(&str) -> StoreResult<u64> + Sync,
    {
        let total = plan.len() as u64;
        if total == 0 {
            return Ok(TransferStats::default());
        }

        let token = cancel.child();
        let (queue, jobs) = bounded::<Job>(self.queue_capacity);
        let first_error: Mutex<Option<SyncError>> = Mutex::new(None);
        let copied = AtomicU64::new(0);
        let deleted = AtomicU64::new(0);
        let bytes = AtomicU64::new(0);

        let workers = self.concurrency.min(plan.len());

        thread::scope(|scope| {
            for worker in 0..workers {
                let jobs = jobs.clone();
                let token = &token;
                let first_error = &first_error;
                let (copy, delete) = (&copy, &delete);
                let (copied, deleted, bytes) = (&copied, &deleted, &bytes);

                scope.spawn(move || loop {
                    let next = select! {
                        recv(jobs) -> job => job.ok(),
                        recv(token.signal()) -> _ => None,
                    };
                    let Some(job) = next else { break };
                    // select! picks randomly when both are ready.
                    if token.is_cancelled() {
                        break;
                    }

                    let result = match job.kind {
                        JobKind::Copy => copy(&job.relative_path),
                        JobKind::Delete => delete(&job.relative_path),
                    };

                    match result {
                        Ok(moved) => {
                            match job.kind {
                                JobKind::Copy => copied.fetch_add(1, Ordering::SeqCst),
                                JobKind::Delete => deleted.fetch_add(1, Ordering::SeqCst),
                            };
                            bytes.fetch_add(moved, Ordering::SeqCst);
                        }
                        Err(source) => {
                            warn!(
                                worker,
                                operation = %job.kind,
                                path = %job.relative_path,
                                error = %source,
                                "job failed, cancelling remaining work"
                            );
                            {
                                let mut slot = first_error.lock();
                                if slot.is_none() {
                                    *slot = Some(SyncError::Transfer {
                                        operation: job.kind,
                                        path: job.relative_path,
                                        source,
                                    });
                                }
                            }
                            token.cancel();
                            break;
                        }
                    }
                });
            }
            drop(jobs);

            for job in plan.jobs() {
                if token.is_cancelled() {
                    break;
                }
                let delivered = select! {
                    send(queue, job) -> sent => sent.is_ok(),
                    recv(token.signal()) -> _ => false,
                };
                if !delivered {
                    break;
                }
            }
            drop(queue);
        });

        if let Some(err) = first_error.into_inner() {
            return Err(err);
        }

        let stats = TransferStats {
            copied: copied.into_inner(),
            deleted: deleted.into_inner(),
            bytes: bytes.into_inner(),
        };
        if stats.completed() < total {
            debug!(
                completed = stats.completed(),
                planned = total,
                "transfer cancelled before all jobs ran"
            );
            return Err(SyncError::Cancelled);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ObjectRecord, Snapshot};
    use parking_lot::Mutex as PlMutex;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::{Duration, SystemTime};
    use volsync_storage::StoreError;

    fn plan_of(copies: usize, deletes: usize) -> SyncPlan {
        let source: Snapshot = (0..copies)
            .map(|i| ObjectRecord::new(format!("c{i}"), 1, SystemTime::UNIX_EPOCH))
            .collect();
        let destination: Snapshot = (0..deletes)
            .map(|i| ObjectRecord::new(format!("d{i}"), 1, SystemTime::UNIX_EPOCH))
            .collect();
        SyncPlan::compute(&source, &destination, true)
    }

    #[test]
    fn pool_rejects_zero_sizes() {
        assert!(WorkerPool::new(0, 10).is_err());
        assert!(WorkerPool::new(1, 0).is_err());
        assert_eq!(WorkerPool::new(3, 1).unwrap().concurrency(), 3);
    }

    #[test]
    fn empty_plan_is_noop() {
        let pool = WorkerPool::new(4, 4).unwrap();
        let stats = pool
            .execute(&SyncPlan::default(), |_| Ok(0), |_| Ok(0), &CancelToken::new())
            .unwrap();
        assert_eq!(stats, TransferStats::default());
    }

    #[test]
    fn every_job_runs_exactly_once() {
        let pool = WorkerPool::new(8, 4).unwrap();
        let plan = plan_of(200, 50);
        let seen = PlMutex::new(Vec::new());

        let stats = pool
            .execute(
                &plan,
                |path| {
                    seen.lock().push(format!("copy:{path}"));
                    Ok(10)
                },
                |path| {
                    seen.lock().push(format!("delete:{path}"));
                    Ok(0)
                },
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(stats.copied, 200);
        assert_eq!(stats.deleted, 50);
        assert_eq!(stats.bytes, 2000);

        let seen = seen.into_inner();
        let unique: HashSet<_> = seen.iter().collect();
        assert_eq!(seen.len(), 250);
        assert_eq!(unique.len(), 250);
    }

    #[test]
    fn concurrency_bound_is_respected() {
        let pool = WorkerPool::new(3, 2).unwrap();
        let plan = plan_of(60, 0);
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        pool.execute(
            &plan,
            |_| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(2));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(0)
            },
            |_| Ok(0),
            &CancelToken::new(),
        )
        .unwrap();

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 1);
    }

    #[test]
    fn first_error_is_returned_and_work_stops() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let plan = plan_of(100, 0);
        let started = AtomicUsize::new(0);

        let err = pool
            .execute(
                &plan,
                |path| {
                    started.fetch_add(1, Ordering::SeqCst);
                    if started.load(Ordering::SeqCst) == 5 {
                        Err(StoreError::backend(format!("boom at {path}")))
                    } else {
                        Ok(0)
                    }
                },
                |_| Ok(0),
                &CancelToken::new(),
            )
            .unwrap_err();

        match err {
            SyncError::Transfer {
                operation, source, ..
            } => {
                assert_eq!(operation, JobKind::Copy);
                assert!(source.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // A single worker dispatches nothing after its own failure.
        assert_eq!(started.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn no_job_starts_after_a_failure_with_many_workers() {
        const WORKERS: usize = 4;
        let pool = WorkerPool::new(WORKERS, WORKERS).unwrap();
        let plan = plan_of(100, 0);
        let all_in_flight = Barrier::new(WORKERS);
        let started = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let late_starts = AtomicUsize::new(0);

        let err = pool
            .execute(
                &plan,
                |path| {
                    if failed.load(Ordering::SeqCst) {
                        late_starts.fetch_add(1, Ordering::SeqCst);
                    }
                    let n = started.fetch_add(1, Ordering::SeqCst);
                    if n < WORKERS {
                        all_in_flight.wait();
                    }
                    if n == 0 {
                        failed.store(true, Ordering::SeqCst);
                        return Err(StoreError::backend(format!("boom at {path}")));
                    }
                    // Outlive the failing job so cancellation lands first.
                    thread::sleep(Duration::from_millis(50));
                    Ok(0)
                },
                |_| Ok(0),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(err, SyncError::Transfer { .. }));
        assert_eq!(started.load(Ordering::SeqCst), WORKERS);
        assert_eq!(late_starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn only_one_error_survives_concurrent_failures() {
        let pool = WorkerPool::new(8, 16).unwrap();
        let plan = plan_of(64, 0);

        let err = pool
            .execute(
                &plan,
                |path| Err(StoreError::backend(format!("failed {path}"))),
                |_| Ok(0),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::Transfer { .. }));
    }

    #[test]
    fn external_cancel_stops_dispatch() {
        let pool = WorkerPool::new(2, 2).unwrap();
        let plan = plan_of(100, 0);
        let cancel = CancelToken::new();
        let ran = AtomicUsize::new(0);

        let err = pool
            .execute(
                &plan,
                |_| {
                    if ran.fetch_add(1, Ordering::SeqCst) == 3 {
                        cancel.cancel();
                    }
                    Ok(0)
                },
                |_| Ok(0),
                &cancel,
            )
            .unwrap_err();

        assert!(matches!(err, SyncError::Cancelled));
        assert!(ran.load(Ordering::SeqCst) < 100);
    }

    #[test]
    fn pre_cancelled_token_runs_nothing() {
        let pool = WorkerPool::new(4, 4).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ran = AtomicUsize::new(0);

        let result = pool.execute(
            &plan_of(10, 0),
            |_| {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            },
            |_| Ok(0),
            &cancel,
        );
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn child_token_follows_parent_only() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let second = parent.child();
        parent.cancel();
        assert!(second.is_cancelled());
        assert!(second.signal().recv().is_err());

        let late = parent.child();
        assert!(late.is_cancelled());
    }
}
