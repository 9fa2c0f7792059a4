//! Directory-backed object store.

use crate::error::{StoreError, StoreResult};
use crate::store::{
    paginate, validate_bucket, validate_key, ListPage, ObjectMeta, ObjectStore, DEFAULT_PAGE_SIZE,
};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the directory under the root that holds in-progress writes.
const STAGING_DIR: &str = ".staging";

/// An object store whose buckets are directories.
///
/// Bucket `b` lives at `<root>/b` and key `dir/file` at `<root>/b/dir/file`.
/// Useful for backing up to a mounted network share or a second disk.
///
/// # Durability
///
/// - Writes go to a staging file under `<root>/.staging` and are renamed
///   into place, so a listing never observes a half-written object
/// - Deleting the last object in a directory prunes the empty directories,
///   matching the flat-namespace model of hosted stores
/// - Pruning holds the tree lock exclusively; writers hold it shared from
///   creating the parent directory until the rename, so a concurrent delete
///   never removes a directory a write is about to land in
///
/// # Example
///
/// ```no_run
/// use volsync_storage::{FileStore, ObjectStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("/mnt/backup")).unwrap();
/// store.create_bucket("volumes").unwrap();
/// store.put_object("volumes", "db/data.bin", &mut &b"..."[..]).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    page_size: usize,
    tree: RwLock<()>,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or staging directory cannot be created.
    pub fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
            tree: RwLock::new(()),
        })
    }

    /// Sets the number of objects returned per listing page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a bucket directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the directory cannot be created.
    pub fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        validate_bucket(bucket)?;
        fs::create_dir_all(self.root.join(bucket))?;
        Ok(())
    }

    fn bucket_dir(&self, bucket: &str) -> StoreResult<PathBuf> {
        validate_bucket(bucket)?;
        let dir = self.root.join(bucket);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StoreError::NoSuchBucket(bucket.to_string()))
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        let mut path = self.bucket_dir(bucket)?;
        path.extend(key.split('/'));
        Ok(path)
    }

    /// Removes empty directories between `path` and the bucket root.
    fn prune_empty_parents(&self, bucket_dir: &Path, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == bucket_dir || !dir.starts_with(bucket_dir) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

/// Converts a path below `base` into a `/`-separated key.
fn key_for(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
    Some(segments?.join("/"))
}

impl ObjectStore for FileStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
    ) -> StoreResult<ListPage> {
        let dir = self.bucket_dir(bucket)?;

        let mut matching = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = key_for(&dir, entry.path()) else {
                debug!(path = %entry.path().display(), "skipping non-UTF-8 path");
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            let metadata = entry.metadata().map_err(io::Error::from)?;
            matching.push(ObjectMeta {
                key,
                size: metadata.len(),
                last_modified: metadata.modified()?,
            });
        }
        matching.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(paginate(matching, continuation, self.page_size))
    }

    fn get_object(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> StoreResult<u64> {
        let path = self.object_path(bucket, key)?;
        let mut file = File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(e)
            }
        })?;
        Ok(io::copy(&mut file, sink)?)
    }

    fn put_object(&self, bucket: &str, key: &str, body: &mut dyn Read) -> StoreResult<u64> {
        let path = self.object_path(bucket, key)?;

        let mut staged = NamedTempFile::new_in(self.root.join(STAGING_DIR))?;
        let written = io::copy(body, &mut staged)?;
        staged.as_file().sync_all()?;

        let _tree = self.tree.read();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        staged.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        Ok(written)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let path = self.object_path(bucket, key)?;
        let _tree = self.tree.write();
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_parents(&bucket_dir, &path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
