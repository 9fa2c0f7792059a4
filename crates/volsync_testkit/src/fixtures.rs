//! Test fixtures for local volumes and seeded stores.
//!
//! Provides temporary directories that behave like a mounted volume,
//! plus helpers to compare their content with a bucket prefix.

use filetime::FileTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use volsync_storage::InMemoryStore;
use walkdir::WalkDir;

/// Relative path to content, ordered for stable comparisons.
pub type Tree = BTreeMap<String, Vec<u8>>;

/// A temporary directory standing in for a volume, removed on drop.
pub struct TempVolume {
    dir: TempDir,
}

impl TempVolume {
    /// Creates an empty volume.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Creates a volume holding `tree`.
    pub fn with_tree(tree: &Tree) -> Self {
        let volume = Self::new();
        for (path, data) in tree {
            volume.write_file(path, data);
        }
        volume
    }

    /// Returns the volume root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the volume root as an endpoint string.
    pub fn endpoint(&self) -> String {
        self.dir.path().display().to_string()
    }

    /// Resolves a `/`-separated relative path under the root.
    pub fn join(&self, relative_path: &str) -> PathBuf {
        let mut path = self.dir.path().to_path_buf();
        path.extend(relative_path.split('/'));
        path
    }

    /// Writes a file, creating parent directories.
    pub fn write_file(&self, relative_path: &str, data: &[u8]) -> PathBuf {
        let path = self.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, data).expect("Failed to write file");
        path
    }

    /// Writes a file and stamps its modification time.
    pub fn write_file_at(&self, relative_path: &str, data: &[u8], modified: SystemTime) -> PathBuf {
        let path = self.write_file(relative_path, data);
        self.set_mtime(relative_path, modified);
        path
    }

    /// Sets a file's modification time.
    pub fn set_mtime(&self, relative_path: &str, modified: SystemTime) {
        filetime::set_file_mtime(self.join(relative_path), FileTime::from_system_time(modified))
            .expect("Failed to set mtime");
    }

    /// Gets a file's modification time.
    pub fn mtime(&self, relative_path: &str) -> SystemTime {
        fs::metadata(self.join(relative_path))
            .and_then(|m| m.modified())
            .expect("Failed to read mtime")
    }

    /// Reads a file, or `None` if it does not exist.
    pub fn read_file(&self, relative_path: &str) -> Option<Vec<u8>> {
        fs::read(self.join(relative_path)).ok()
    }

    /// Returns true if a regular file exists at the path.
    pub fn exists(&self, relative_path: &str) -> bool {
        self.join(relative_path).is_file()
    }

    /// Removes a file.
    pub fn remove_file(&self, relative_path: &str) {
        fs::remove_file(self.join(relative_path)).expect("Failed to remove file");
    }

    /// Reads every regular file under the root.
    pub fn tree(&self) -> Tree {
        let mut tree = Tree::new();
        for entry in WalkDir::new(self.dir.path()) {
            let entry = entry.expect("Failed to walk volume");
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(self.dir.path())
                .expect("Entry outside volume root");
            let key = relative
                .iter()
                .map(|c| c.to_str().expect("Non UTF-8 path"))
                .collect::<Vec<_>>()
                .join("/");
            let data = fs::read(entry.path()).expect("Failed to read file");
            tree.insert(key, data);
        }
        tree
    }
}

impl Default for TempVolume {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed point in time, `secs` after the epoch.
///
/// Whole seconds survive every filesystem's timestamp resolution.
pub fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// Builds an in-memory store whose `bucket` holds `entries` under `prefix`.
///
/// All objects share one last-modified time, [`at`]`(1_600_000_000)`.
pub fn seeded_store(bucket: &str, prefix: &str, entries: &[(&str, &[u8])]) -> InMemoryStore {
    let store = InMemoryStore::new();
    store.create_bucket(bucket);
    for (relative_path, data) in entries {
        store.insert(bucket, &prefixed(prefix, relative_path), data.to_vec(), at(1_600_000_000));
    }
    store
}

/// Reads every object under `prefix` in `bucket`, keyed by relative path.
pub fn store_tree(store: &InMemoryStore, bucket: &str, prefix: &str) -> Tree {
    let list_prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    };
    store
        .keys(bucket)
        .into_iter()
        .filter_map(|key| {
            let relative = key.strip_prefix(&list_prefix)?.to_string();
            let data = store.object(bucket, &key)?;
            Some((relative, data))
        })
        .collect()
}

fn prefixed(prefix: &str, relative_path: &str) -> String {
    if prefix.is_empty() {
        relative_path.to_string()
    } else {
        format!("{prefix}/{relative_path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_write_and_tree() {
        let volume = TempVolume::new();
        volume.write_file("a/b.txt", b"one");
        volume.write_file("c.txt", b"two");

        let tree = volume.tree();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree["a/b.txt"], b"one");
        assert!(volume.exists("c.txt"));
        assert!(!volume.exists("a"));
    }

    #[test]
    fn volume_mtime_roundtrip() {
        let volume = TempVolume::new();
        volume.write_file_at("x", b"1", at(1_000));
        assert_eq!(volume.mtime("x"), at(1_000));
    }

    #[test]
    fn seeded_store_uses_prefix() {
        let store = seeded_store("b", "vol", &[("a.txt", b"hi"), ("d/e", b"yo")]);
        assert_eq!(store.keys("b"), vec!["vol/a.txt", "vol/d/e"]);

        let tree = store_tree(&store, "b", "vol");
        assert_eq!(tree["d/e"], b"yo");
    }
}
