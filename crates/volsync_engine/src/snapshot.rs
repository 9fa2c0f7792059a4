//! Point-in-time listings of one side of a sync.

use crate::endpoint::RemoteLocation;
use crate::filter::Filter;
use std::collections::hash_map::{self, HashMap};
use std::io;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;
use volsync_storage::{ObjectStore, StoreError, StoreResult};
use walkdir::WalkDir;

/// Metadata for one file or object, keyed by its path relative to the endpoint root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// `/`-separated path relative to the endpoint root.
    pub relative_path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub modified_at: SystemTime,
}

impl ObjectRecord {
    /// Creates a record.
    pub fn new(relative_path: impl Into<String>, size: u64, modified_at: SystemTime) -> Self {
        Self {
            relative_path: relative_path.into(),
            size,
            modified_at,
        }
    }
}

/// Mapping from relative path to record for one endpoint.
///
/// Built once per sync and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: HashMap<String, ObjectRecord>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record; a repeated path replaces the earlier record.
    pub fn insert(&mut self, record: ObjectRecord) {
        self.records.insert(record.relative_path.clone(), record);
    }

    /// Returns the record for a path.
    pub fn get(&self, relative_path: &str) -> Option<&ObjectRecord> {
        self.records.get(relative_path)
    }

    /// Returns true if the path is present.
    pub fn contains(&self, relative_path: &str) -> bool {
        self.records.contains_key(relative_path)
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the snapshot has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in unspecified order.
    pub fn iter(&self) -> hash_map::Values<'_, String, ObjectRecord> {
        self.records.values()
    }

    /// Sum of all record sizes.
    pub fn total_size(&self) -> u64 {
        self.records.values().map(|r| r.size).sum()
    }
}

impl FromIterator<ObjectRecord> for Snapshot {
    fn from_iter<I: IntoIterator<Item = ObjectRecord>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for record in iter {
            snapshot.insert(record);
        }
        snapshot
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a ObjectRecord;
    type IntoIter = hash_map::Values<'a, String, ObjectRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lists every regular file under `root`.
///
/// Directories are skipped, as are symlinks and other special files.
/// Any unreadable entry aborts the listing.
///
/// # Errors
///
/// Returns an error if `root` does not exist or any entry cannot be read.
pub fn enumerate_local(root: &Path, filter: &Filter) -> StoreResult<Snapshot> {
    let mut snapshot = Snapshot::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            debug!(path = %entry.path().display(), "skipping non-regular file");
            continue;
        }

        let relative_path = relative_key(root, entry.path())?;
        if !filter.allows(&relative_path) {
            continue;
        }

        let metadata = entry.metadata().map_err(io::Error::from)?;
        snapshot.insert(ObjectRecord {
            relative_path,
            size: metadata.len(),
            modified_at: metadata.modified()?,
        });
    }

    debug!(root = %root.display(), files = snapshot.len(), "enumerated local directory");
    Ok(snapshot)
}

/// Lists every object under a remote location, following all pages.
///
/// Sizes and times come from listing metadata only.
///
/// # Errors
///
/// Returns the first listing error; no partial snapshot is produced.
/// A key whose relative path could leave the local root (a `.` or `..`
/// segment, an empty segment, or a backslash) aborts the listing with
/// [`StoreError::InvalidKey`].
pub fn enumerate_remote<S: ObjectStore + ?Sized>(
    store: &S,
    location: &RemoteLocation,
    filter: &Filter,
) -> StoreResult<Snapshot> {
    let mut snapshot = Snapshot::new();
    let prefix = location.list_prefix();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.list_page(location.bucket(), &prefix, token.as_deref())?;
        pages += 1;

        for object in &page.objects {
            let Some(relative_path) = location.relative_path(&object.key) else {
                continue;
            };
            if !is_safe_relative_path(relative_path) {
                return Err(StoreError::InvalidKey(object.key.clone()));
            }
            if !filter.allows(relative_path) {
                continue;
            }
            snapshot.insert(ObjectRecord::new(
                relative_path,
                object.size,
                object.last_modified,
            ));
        }

        match page.next_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    debug!(location = %location, objects = snapshot.len(), pages, "enumerated remote prefix");
    Ok(snapshot)
}

/// True if joining `relative_path` onto a directory stays inside it.
fn is_safe_relative_path(relative_path: &str) -> bool {
    !relative_path.contains('\\')
        && relative_path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

/// Converts a path under `root` into a `/`-separated relative key.
fn relative_key(root: &Path, path: &Path) -> io::Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not under {}", path.display(), root.display()),
        )
    })?;

    let mut segments = Vec::new();
    for component in relative.iter() {
        let segment = component.to_str().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("path is not valid UTF-8: {}", path.display()),
            )
        })?;
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;
    use volsync_storage::InMemoryStore;

    fn location(uri: &str) -> RemoteLocation {
        Endpoint::parse(uri).unwrap().as_remote().unwrap().clone()
    }

    #[test]
    fn snapshot_last_insert_wins() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(ObjectRecord::new("a", 1, SystemTime::UNIX_EPOCH));
        snapshot.insert(ObjectRecord::new("a", 2, SystemTime::UNIX_EPOCH));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a").unwrap().size, 2);
    }

    #[test]
    fn snapshot_from_iter_and_total() {
        let snapshot: Snapshot = [
            ObjectRecord::new("a", 3, SystemTime::UNIX_EPOCH),
            ObjectRecord::new("b", 4, SystemTime::UNIX_EPOCH),
        ]
        .into_iter()
        .collect();
        assert_eq!(snapshot.total_size(), 7);
        assert!(snapshot.contains("b"));
        assert_eq!((&snapshot).into_iter().count(), 2);
    }

    #[test]
    fn local_enumeration_skips_dirs_and_uses_forward_slashes() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("top.txt"), b"12345").unwrap();
        fs::write(dir.path().join("sub/deeper/leaf.bin"), b"xy").unwrap();

        let snapshot = enumerate_local(dir.path(), &Filter::all()).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("top.txt").unwrap().size, 5);
        assert_eq!(snapshot.get("sub/deeper/leaf.bin").unwrap().size, 2);
        assert!(!snapshot.contains("empty"));
        assert!(!snapshot.contains("sub"));
    }

    #[test]
    fn local_enumeration_applies_filter() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".volsync_done"), b"x").unwrap();
        fs::write(dir.path().join("data.db"), b"x").unwrap();

        let snapshot =
            enumerate_local(dir.path(), &Filter::exclude_suffix(".volsync_done")).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("data.db"));
    }

    #[test]
    fn local_enumeration_missing_root_fails() {
        let dir = tempdir().unwrap();
        let result = enumerate_local(&dir.path().join("absent"), &Filter::all());
        assert!(result.is_err());
    }

    #[test]
    fn remote_enumeration_strips_prefix_and_markers() {
        let store = InMemoryStore::new();
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        store.insert("b", "vol/", Vec::new(), when);
        store.insert("b", "vol/a.txt", b"hello".to_vec(), when);
        store.insert("b", "vol/dir/", Vec::new(), when);
        store.insert("b", "vol/dir/b.txt", b"hi".to_vec(), when);
        store.insert("b", "volume-other/c.txt", b"no".to_vec(), when);

        let snapshot = enumerate_remote(&store, &location("mem://b/vol"), &Filter::all()).unwrap();
        assert_eq!(snapshot.len(), 2);
        let record = snapshot.get("a.txt").unwrap();
        assert_eq!(record.size, 5);
        assert_eq!(record.modified_at, when);
        assert!(snapshot.contains("dir/b.txt"));
    }

    #[test]
    fn remote_enumeration_follows_pages() {
        let store = InMemoryStore::new().with_page_size(3);
        for i in 0..10 {
            store.insert("b", &format!("f{i:02}"), vec![1u8; i], SystemTime::UNIX_EPOCH);
        }

        let snapshot = enumerate_remote(&store, &location("mem://b"), &Filter::all()).unwrap();
        assert_eq!(snapshot.len(), 10);
        assert_eq!(snapshot.get("f09").unwrap().size, 9);
    }

    #[test]
    fn remote_enumeration_applies_filter() {
        let store = InMemoryStore::new();
        store.insert("b", "keep.txt", b"k".to_vec(), SystemTime::UNIX_EPOCH);
        store.insert("b", "ignore.tmp", b"i".to_vec(), SystemTime::UNIX_EPOCH);

        let filter = Filter::exclude_globs(["*.tmp"]).unwrap();
        let snapshot = enumerate_remote(&store, &location("mem://b"), &filter).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("keep.txt"));
    }

    #[test]
    fn remote_enumeration_rejects_escaping_keys() {
        for key in [
            "vol/../../escaped.txt",
            "vol/a/../b.txt",
            "vol/./a.txt",
            "vol/a//b.txt",
            "vol/win\\evil.txt",
        ] {
            let store = InMemoryStore::new();
            store.insert("b", "vol/fine.txt", b"ok".to_vec(), SystemTime::UNIX_EPOCH);
            store.insert("b", key, b"x".to_vec(), SystemTime::UNIX_EPOCH);

            let result = enumerate_remote(&store, &location("mem://b/vol"), &Filter::all());
            match result {
                Err(StoreError::InvalidKey(rejected)) => assert_eq!(rejected, key),
                other => panic!("{key:?} was accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn safe_relative_paths() {
        assert!(is_safe_relative_path("a.txt"));
        assert!(is_safe_relative_path("dir/..hidden/a..b"));
        assert!(!is_safe_relative_path(".."));
        assert!(!is_safe_relative_path("a/../../b"));
        assert!(!is_safe_relative_path("a/"));
    }

    #[test]
    fn remote_enumeration_missing_bucket_fails() {
        let store = InMemoryStore::new();
        assert!(enumerate_remote(&store, &location("mem://nope"), &Filter::all()).is_err());
    }
}
