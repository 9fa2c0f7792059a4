//! One-shot sync command implementation.

use super::open_store_for;
use crate::config::sync_filter;
use std::error::Error;
use std::path::PathBuf;
use volsync_engine::{SyncConfig, SyncReport, Syncer};

/// Options shared by `sync` and `plan`.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Delete destination entries missing from the source.
    pub delete: bool,
    /// Transfer workers.
    pub concurrency: usize,
    /// Glob patterns to exclude.
    pub exclude: Vec<String>,
    /// Root directory for `file://` remotes.
    pub store_root: PathBuf,
}

impl SyncOptions {
    /// Builds the engine configuration.
    pub fn sync_config(&self) -> Result<SyncConfig, Box<dyn Error>> {
        Ok(SyncConfig::new()
            .with_concurrency(self.concurrency)
            .with_delete(self.delete)
            .with_filter(sync_filter(&self.exclude)?))
    }
}

/// Runs the sync command.
pub fn run(
    source: &str,
    destination: &str,
    options: &SyncOptions,
) -> Result<SyncReport, Box<dyn Error>> {
    let store = open_store_for(source, destination, &options.store_root)?;
    let syncer = Syncer::new(options.sync_config()?, store)?;
    let report = syncer.sync(source, destination)?;

    println!(
        "{}: copied {}, deleted {}, {} bytes in {:.2?}",
        report.direction, report.copied, report.deleted, report.bytes_transferred, report.duration
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn sync_up_then_down_through_file_store() {
        let store_root = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("a.txt"), b"alpha").unwrap();
        fs::write(source.path().join("skip.tmp"), b"tmp").unwrap();
        let options = SyncOptions {
            delete: false,
            concurrency: 2,
            exclude: vec!["*.tmp".into()],
            store_root: store_root.path().to_path_buf(),
        };

        let up = run(source.path().to_str().unwrap(), "file://bkt/p", &options).unwrap();
        assert_eq!(up.copied, 1);
        assert!(store_root.path().join("bkt/p/a.txt").is_file());

        let target = tempfile::tempdir().unwrap();
        let down = run("file://bkt/p", target.path().to_str().unwrap(), &options).unwrap();
        assert_eq!(down.copied, 1);
        assert_eq!(fs::read(target.path().join("a.txt")).unwrap(), b"alpha");
    }

    #[test]
    fn zero_concurrency_rejected() {
        let store_root = tempfile::tempdir().unwrap();
        let options = SyncOptions {
            delete: false,
            concurrency: 0,
            exclude: Vec::new(),
            store_root: store_root.path().to_path_buf(),
        };
        assert!(run("/tmp", "file://b", &options).is_err());
    }
}
