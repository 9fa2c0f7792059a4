//! Direction-specific copy and delete executors.

use crate::endpoint::RemoteLocation;
use crate::snapshot::Snapshot;
use filetime::FileTime;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use volsync_storage::{ObjectStore, StoreResult};

/// Joins a `/`-separated relative path onto a local root.
pub(crate) fn local_path(root: &Path, relative_path: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    path.extend(relative_path.split('/'));
    path
}

/// Copies objects down into a local directory.
pub(crate) struct Download<'a, S: ?Sized> {
    pub store: &'a S,
    pub location: &'a RemoteLocation,
    pub root: &'a Path,
    pub source: &'a Snapshot,
}

impl<S: ObjectStore + ?Sized> Download<'_, S> {
    /// Fetches one object into its local file, creating parent directories.
    ///
    /// The file's mtime is set to the object's last-modified time so the
    /// next upload sees the two sides as equal.
    pub fn copy(&self, relative_path: &str) -> StoreResult<u64> {
        let key = self.location.object_key(relative_path);
        let path = local_path(self.root, relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        let written = self
            .store
            .get_object(self.location.bucket(), &key, &mut writer)?;
        writer.flush()?;
        drop(writer);

        if let Some(record) = self.source.get(relative_path) {
            filetime::set_file_mtime(&path, FileTime::from_system_time(record.modified_at))?;
        }

        debug!(key = %key, path = %path.display(), bytes = written, "downloaded");
        Ok(written)
    }

    /// Removes one local file. A file that is already gone counts as removed.
    pub fn delete(&self, relative_path: &str) -> StoreResult<u64> {
        let path = local_path(self.root, relative_path);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(path = %path.display(), "deleted local file");
        Ok(0)
    }
}

/// Copies local files up into an object store.
pub(crate) struct Upload<'a, S: ?Sized> {
    pub store: &'a S,
    pub location: &'a RemoteLocation,
    pub root: &'a Path,
}

impl<S: ObjectStore + ?Sized> Upload<'_, S> {
    /// Streams one local file into its object key.
    pub fn copy(&self, relative_path: &str) -> StoreResult<u64> {
        let key = self.location.object_key(relative_path);
        let path = local_path(self.root, relative_path);

        let mut reader = BufReader::new(File::open(&path)?);
        let written = self
            .store
            .put_object(self.location.bucket(), &key, &mut reader)?;

        debug!(path = %path.display(), key = %key, bytes = written, "uploaded");
        Ok(written)
    }

    /// Deletes one remote object.
    pub fn delete(&self, relative_path: &str) -> StoreResult<u64> {
        let key = self.location.object_key(relative_path);
        self.store.delete_object(self.location.bucket(), &key)?;
        debug!(key = %key, "deleted remote object");
        Ok(0)
    }
}
