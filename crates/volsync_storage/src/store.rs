//! Object store trait definition.

use crate::error::{StoreError, StoreResult};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

/// Maximum number of objects returned by a single listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Metadata of one stored object, as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Full object key, including the listing prefix.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
    /// Time the object was last written.
    pub last_modified: SystemTime,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects on this page, in ascending key order.
    pub objects: Vec<ObjectMeta>,
    /// Token to pass to the next call, or `None` if this is the last page.
    pub next_token: Option<String>,
}

impl ListPage {
    /// Returns true if more pages follow this one.
    pub fn has_more(&self) -> bool {
        self.next_token.is_some()
    }
}

/// A remote object store as seen by the sync engine.
///
/// Stores expose buckets of flat keys. The engine needs exactly four
/// operations and nothing else from a storage client.
///
/// # Invariants
///
/// - `list_page` returns keys starting with `prefix`, in ascending order
/// - following `next_token` until it is `None` visits every key exactly once
/// - `put_object` replaces any existing object at `key`
/// - `delete_object` on a missing key succeeds
/// - Stores must be `Send + Sync` for concurrent transfers
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - Directory-backed buckets
/// - [`super::S3Store`] - The S3 API
pub trait ObjectStore: Send + Sync {
    /// Lists one page of objects whose key starts with `prefix`.
    ///
    /// Pass `None` as `continuation` for the first page, then the
    /// `next_token` of the previous page.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket does not exist, the token is invalid,
    /// or the backend fails.
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage>;

    /// Streams the object content into `sink`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or the copy fails.
    fn get_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> StoreResult<u64>;

    /// Writes everything `body` yields into the object at `key`.
    ///
    /// Returns the number of bytes stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket does not exist, the key is invalid,
    /// or reading `body` fails.
    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> StoreResult<u64>;

    /// Deletes the object at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket does not exist or the backend fails.
    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage> {
        (**self).list_page(bucket, prefix, continuation)
    }

    fn get_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> StoreResult<u64> {
        (**self).get_object(bucket, key, sink)
    }

    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> StoreResult<u64> {
        (**self).put_object(bucket, key, body)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        (**self).delete_object(bucket, key)
    }
}

/// Rejects keys that cannot round-trip through a directory tree.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

/// Rejects bucket names that are empty, hidden, or contain separators.
pub(crate) fn validate_bucket(bucket: &str) -> StoreResult<()> {
    if bucket.is_empty()
        || bucket.starts_with('.')
        || bucket.contains('/')
        || bucket.contains('\\')
    {
        Err(StoreError::InvalidBucket(bucket.to_string()))
    } else {
        Ok(())
    }
}

/// Cuts a sorted key listing into one page after `continuation`.
pub(crate) fn paginate(
    sorted: Vec<ObjectMeta>,
    continuation: Option<&str>,
    page_size: usize,
) -> ListPage {
    let mut objects: Vec<ObjectMeta> = sorted
        .into_iter()
        .filter(|meta| continuation.is_none_or(|token| meta.key.as_str() > token))
        .collect();

    let next_token = if objects.len() > page_size {
        objects.truncate(page_size);
        objects.last().map(|meta| meta.key.clone())
    } else {
        None
    };

    ListPage {
        objects,
        next_token,
    }
}
