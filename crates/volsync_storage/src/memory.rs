//! In-memory object store for testing.

use crate::error::{StoreError, StoreResult};
use crate::store::{paginate, ListPage, ObjectMeta, ObjectStore, DEFAULT_PAGE_SIZE};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::time::SystemTime;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: SystemTime,
}

type Bucket = BTreeMap<String, StoredObject>;

/// An in-memory object store.
///
/// This store keeps all buckets in memory and is suitable for:
/// - Unit tests
/// - Integration tests of the sync engine
///
/// Buckets must be created with [`InMemoryStore::create_bucket`] before use,
/// mirroring hosted stores where a missing bucket is an error.
///
/// # Example
///
/// ```rust
/// use volsync_storage::{InMemoryStore, ObjectStore};
///
/// let store = InMemoryStore::new();
/// store.create_bucket("b");
/// store.put_object("b", "k", &mut &b"data"[..]).unwrap();
///
/// let mut out = Vec::new();
/// store.get_object("b", "k", &mut out).unwrap();
/// assert_eq!(out, b"data");
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    page_size: usize,
}

impl InMemoryStore {
    /// Creates a new store with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the number of objects returned per listing page.
    ///
    /// Small page sizes are useful to exercise pagination.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Creates a bucket if it does not exist yet.
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_string()).or_default();
    }

    /// Inserts an object with an explicit last-modified time.
    ///
    /// Creates the bucket if needed. Useful for preloading test fixtures.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>, last_modified: SystemTime) {
        self.buckets
            .write()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.into(),
                    last_modified,
                },
            );
    }

    /// Returns a copy of an object's content, if present.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|obj| obj.data.clone())
    }

    /// Returns all keys in a bucket, in ascending order.
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage> {
        let buckets = self.buckets.read();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;

        if let Some(token) = continuation {
            if !token.starts_with(prefix) {
                return Err(StoreError::InvalidContinuationToken(token.to_string()));
            }
        }

        let matching = objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectMeta {
                key: key.clone(),
                size: obj.data.len() as u64,
                last_modified: obj.last_modified,
            })
            .collect();

        Ok(paginate(matching, continuation, self.page_size))
    }

    fn get_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> StoreResult<u64> {
        // Copy out under the lock, write after releasing it.
        let data = {
            let buckets = self.buckets.read();
            let objects = buckets
                .get(bucket)
                .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
            objects
                .get(key)
                .map(|obj| obj.data.clone())
                .ok_or_else(|| StoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?
        };

        sink.write_all(&data)?;
        Ok(data.len() as u64)
    }

    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> StoreResult<u64> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }

        let mut data = Vec::new();
        body.read_to_end(&mut data)?;
        let written = data.len() as u64;

        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: SystemTime::now(),
            },
        );

        Ok(written)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }
}
