//! Object store wrappers for fault injection and instrumentation.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use volsync_storage::{ListPage, ObjectStore, StoreError, StoreResult};

/// Wraps a store and fails chosen operations on demand.
///
/// Transfer calls (`get`, `put`, `delete`) fail for any key registered with
/// [`FaultyStore::fail_on_key`]. Listing fails after
/// [`FaultyStore::fail_listing`] is switched on.
pub struct FaultyStore<S> {
    inner: S,
    failing_keys: RwLock<HashSet<String>>,
    fail_list: AtomicBool,
    tripped: AtomicBool,
    transfers: AtomicUsize,
    after_failure: AtomicUsize,
    lists: AtomicUsize,
}

impl<S: ObjectStore> FaultyStore<S> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_keys: RwLock::new(HashSet::new()),
            fail_list: AtomicBool::new(false),
            tripped: AtomicBool::new(false),
            transfers: AtomicUsize::new(0),
            after_failure: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        }
    }

    /// Makes every transfer touching `key` fail.
    pub fn fail_on_key(&self, key: impl Into<String>) {
        self.failing_keys.write().insert(key.into());
    }

    /// Switches listing failures on or off.
    pub fn fail_listing(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Number of transfer calls seen, including failed ones.
    pub fn transfer_calls(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    /// Transfer calls that started after an injected failure was returned.
    pub fn calls_after_failure(&self) -> usize {
        self.after_failure.load(Ordering::SeqCst)
    }

    /// Number of listing calls seen.
    pub fn list_calls(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, key: &str) -> StoreResult<()> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        if self.tripped.load(Ordering::SeqCst) {
            self.after_failure.fetch_add(1, Ordering::SeqCst);
        }
        if self.failing_keys.read().contains(key) {
            self.tripped.store(true, Ordering::SeqCst);
            return Err(StoreError::backend(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

impl<S: ObjectStore> ObjectStore for FaultyStore<S> {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected listing failure"));
        }
        self.inner.list_page(bucket, prefix, continuation)
    }

    fn get_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> StoreResult<u64> {
        self.check(key)?;
        self.inner.get_object(bucket, key, sink)
    }

    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> StoreResult<u64> {
        self.check(key)?;
        self.inner.put_object(bucket, key, body)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.check(key)?;
        self.inner.delete_object(bucket, key)
    }
}

/// Wraps a store and records how many transfers run at once.
///
/// Each transfer sleeps for a fixed delay so overlapping calls are
/// observable.
pub struct InstrumentedStore<S> {
    inner: S,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl<S: ObjectStore> InstrumentedStore<S> {
    /// Wraps `inner`, holding each transfer open for `delay`.
    pub fn new(inner: S, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Highest number of transfers observed running together.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total transfer calls.
    pub fn transfer_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn track<T>(&self, op: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        let result = op();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl<S: ObjectStore> ObjectStore for InstrumentedStore<S> {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage> {
        self.inner.list_page(bucket, prefix, continuation)
    }

    fn get_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> StoreResult<u64> {
        self.track(|| self.inner.get_object(bucket, key, sink))
    }

    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> StoreResult<u64> {
        self.track(|| self.inner.put_object(bucket, key, body))
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.track(|| self.inner.delete_object(bucket, key))
    }
}
