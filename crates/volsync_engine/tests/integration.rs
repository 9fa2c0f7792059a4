//! Integration tests for the sync engine against real directories and stores.

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use volsync_engine::{
    CancelToken, Direction, Filter, JobKind, Side, SyncConfig, SyncError, SyncState, Syncer,
};
use volsync_storage::{FileStore, InMemoryStore, ObjectStore, StoreError};
use volsync_testkit::prelude::*;

fn syncer<S: ObjectStore>(store: S) -> Syncer<S> {
    Syncer::new(SyncConfig::new(), store).unwrap()
}

#[test]
fn scenario_a_restore_into_empty_directory() {
    let store = seeded_store("bucket", "vol", &[("a.txt", b"hello world!")]);
    let volume = TempVolume::new();

    let report = syncer(store)
        .sync("mem://bucket/vol", &volume.endpoint())
        .unwrap();

    assert_eq!(report.direction, Direction::Download);
    assert_eq!(report.copied, 1);
    assert_eq!(volume.read_file("a.txt").unwrap(), b"hello world!");
    assert_eq!(volume.tree().len(), 1);
}

#[test]
fn scenario_b_backup_into_empty_prefix() {
    let store = Arc::new(seeded_store("bucket", "", &[]));
    let volume = TempVolume::new();
    volume.write_file("b.txt", b"nine byte");

    let report = syncer(Arc::clone(&store))
        .sync(&volume.endpoint(), "mem://bucket/backups/vol1")
        .unwrap();

    assert_eq!(report.direction, Direction::Upload);
    assert_eq!(report.bytes_transferred, 9);
    assert_eq!(
        store.object("bucket", "backups/vol1/b.txt").unwrap(),
        b"nine byte"
    );
}

#[test]
fn scenario_c_excluded_paths_never_sync() {
    let store = seeded_store(
        "bucket",
        "vol",
        &[("keep.txt", b"keep"), ("ignore.tmp", b"ignore")],
    );
    let volume = TempVolume::new();
    let config = SyncConfig::new().with_filter(Filter::exclude_globs(["*.tmp"]).unwrap());

    Syncer::new(config, store)
        .unwrap()
        .sync("mem://bucket/vol", &volume.endpoint())
        .unwrap();

    assert!(volume.exists("keep.txt"));
    assert!(!volume.exists("ignore.tmp"));
}

#[test]
fn scenario_d_stale_destination_entries_deleted() {
    let store = Arc::new(seeded_store(
        "bucket",
        "vol",
        &[("keep.txt", b"k"), ("stale.txt", b"s")],
    ));
    let volume = TempVolume::new();
    volume.write_file("keep.txt", b"k");

    let config = SyncConfig::new().with_delete(true);
    let report = Syncer::new(config, Arc::clone(&store))
        .unwrap()
        .sync(&volume.endpoint(), "mem://bucket/vol")
        .unwrap();

    assert_eq!(report.deleted, 1);
    assert_eq!(store.keys("bucket"), vec!["vol/keep.txt"]);
}

#[test]
fn stale_entries_kept_without_delete_flag() {
    let store = seeded_store("bucket", "", &[("a", b"1")]);
    let volume = TempVolume::new();
    volume.write_file("local-only", b"x");

    syncer(store).sync("mem://bucket", &volume.endpoint()).unwrap();

    assert!(volume.exists("local-only"));
    assert!(volume.exists("a"));
}

#[test]
fn sentinel_is_neither_uploaded_nor_deleted() {
    let store = Arc::new(seeded_store("bucket", "vol", &[]));
    let volume = TempVolume::new();
    volume.write_file(".volsync_done", b"2024-01-01T00:00:00Z");
    volume.write_file("data.db", b"rows");

    let config = SyncConfig::new()
        .with_delete(true)
        .with_filter(Filter::exclude_suffix(".volsync_done"));
    let syncer = Syncer::new(config, Arc::clone(&store)).unwrap();

    syncer.sync(&volume.endpoint(), "mem://bucket/vol").unwrap();
    assert_eq!(store.keys("bucket"), vec!["vol/data.db"]);

    syncer.sync("mem://bucket/vol", &volume.endpoint()).unwrap();
    assert!(volume.exists(".volsync_done"));
}

#[test]
fn second_sync_is_a_noop() {
    let store = Arc::new(seeded_store(
        "bucket",
        "vol",
        &[("a.txt", b"aaa"), ("dir/b.txt", b"bbbb")],
    ));
    let volume = TempVolume::new();
    let syncer = syncer(Arc::clone(&store));

    let first = syncer.sync("mem://bucket/vol", &volume.endpoint()).unwrap();
    assert_eq!(first.copied, 2);

    let second = syncer.sync("mem://bucket/vol", &volume.endpoint()).unwrap();
    assert_eq!(second.planned, 0);

    // Restored files carry the remote timestamps, so backing up right away is free too.
    let back = syncer.sync(&volume.endpoint(), "mem://bucket/vol").unwrap();
    assert_eq!(back.planned, 0);

    let stats = syncer.stats();
    assert_eq!(stats.runs_completed, 3);
    assert_eq!(stats.objects_copied, 2);
}

#[test]
fn newer_local_file_of_same_size_is_uploaded() {
    let store = Arc::new(seeded_store("bucket", "", &[("a", b"old")]));
    let volume = TempVolume::new();
    volume.write_file_at("a", b"new", at(1_700_000_000));

    let report = syncer(Arc::clone(&store))
        .sync(&volume.endpoint(), "mem://bucket")
        .unwrap();

    assert_eq!(report.copied, 1);
    assert_eq!(store.object("bucket", "a").unwrap(), b"new");
}

#[test]
fn older_local_file_of_same_size_is_skipped() {
    let store = Arc::new(seeded_store("bucket", "", &[("a", b"old")]));
    let volume = TempVolume::new();
    volume.write_file_at("a", b"new", at(1_000));

    let report = syncer(Arc::clone(&store))
        .sync(&volume.endpoint(), "mem://bucket")
        .unwrap();

    assert_eq!(report.copied, 0);
    assert_eq!(store.object("bucket", "a").unwrap(), b"old");
}

#[test]
fn first_transfer_failure_is_reported() {
    let entries: Vec<(String, Vec<u8>)> = (0..50)
        .map(|i| (format!("f{i:02}"), vec![b'x'; i + 1]))
        .collect();
    let refs: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_slice()))
        .collect();
    let store = FaultyStore::new(seeded_store("bucket", "", &refs));
    store.fail_on_key("f17");
    let volume = TempVolume::new();

    let config = SyncConfig::new().with_concurrency(1);
    let syncer = Syncer::new(config, store).unwrap();
    let err = syncer
        .sync("mem://bucket", &volume.endpoint())
        .unwrap_err();

    match err {
        SyncError::Transfer {
            operation, path, ..
        } => {
            assert_eq!(operation, JobKind::Copy);
            assert_eq!(path, "f17");
        }
        other => panic!("expected transfer error, got {other}"),
    }
    assert_eq!(syncer.state(), SyncState::Failed);
    assert!(syncer.stats().last_error.unwrap().contains("f17"));
    // One worker: the failing call is the last one made.
    assert_eq!(syncer.store().calls_after_failure(), 0);
}

#[test]
fn listing_failure_aborts_before_transfer() {
    let store = FaultyStore::new(seeded_store("bucket", "", &[]));
    store.fail_listing(true);
    let volume = TempVolume::new();
    volume.write_file("a", b"1");

    let syncer = syncer(store);
    let err = syncer
        .sync(&volume.endpoint(), "mem://bucket")
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Enumerate {
            side: Side::Destination,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_eq!(syncer.store().transfer_calls(), 0);
}

#[test]
fn restore_refuses_keys_that_leave_the_volume() {
    let store = InMemoryStore::new();
    store.insert("bucket", "vol/a.txt", b"fine".to_vec(), at(1_000));
    store.insert("bucket", "vol/../../escaped.txt", b"evil".to_vec(), at(1_000));
    let scratch = TempVolume::new();
    let volume = scratch.join("a/volume");

    let syncer = syncer(store);
    let err = syncer
        .sync("mem://bucket/vol", volume.to_str().unwrap())
        .unwrap_err();

    match err {
        SyncError::Enumerate {
            side: Side::Source,
            source: StoreError::InvalidKey(key),
            ..
        } => assert_eq!(key, "vol/../../escaped.txt"),
        other => panic!("expected invalid key, got {other}"),
    }
    assert!(!scratch.exists("escaped.txt"));
    assert!(!scratch.exists("a/volume/a.txt"));
    assert_eq!(syncer.state(), SyncState::Failed);
}

#[test]
fn concurrency_never_exceeds_limit() {
    let volume = TempVolume::new();
    for i in 0..40 {
        volume.write_file(&format!("dir{}/file{i}", i % 4), b"payload");
    }
    let store = InstrumentedStore::new(seeded_store("bucket", "", &[]), Duration::from_millis(5));

    let config = SyncConfig::new().with_concurrency(4);
    let syncer = Syncer::new(config, store).unwrap();
    let report = syncer.sync(&volume.endpoint(), "mem://bucket").unwrap();

    assert_eq!(report.copied, 40);
    assert_eq!(syncer.store().transfer_calls(), 40);
    assert!(syncer.store().peak_concurrency() <= 4);
    assert!(syncer.store().peak_concurrency() >= 1);
}

#[test]
fn external_cancellation_stops_dispatch() {
    let volume = TempVolume::new();
    for i in 0..20 {
        volume.write_file(&format!("f{i}"), b"x");
    }
    let store = InstrumentedStore::new(seeded_store("bucket", "", &[]), Duration::from_millis(20));
    let config = SyncConfig::new().with_concurrency(1);
    let syncer = Syncer::new(config, store).unwrap();
    let cancel = CancelToken::new();

    let err = std::thread::scope(|scope| {
        let trigger = cancel.clone();
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });
        syncer
            .sync_with_cancel(&volume.endpoint(), "mem://bucket", &cancel)
            .unwrap_err()
    });

    assert!(matches!(err, SyncError::Cancelled));
    assert!(syncer.store().transfer_calls() < 20);
}

#[test]
fn unsupported_modes_rejected() {
    let a = TempVolume::new();
    let b = TempVolume::new();
    let syncer = syncer(InMemoryStore::new());

    assert!(matches!(
        syncer.sync(&a.endpoint(), &b.endpoint()),
        Err(SyncError::UnsupportedMode { .. })
    ));
    assert!(matches!(
        syncer.sync("mem://x", "file://y"),
        Err(SyncError::UnsupportedMode { .. })
    ));
}

#[test]
fn prefix_does_not_match_sibling_prefixes() {
    let store = seeded_store("bucket", "", &[("vol/a", b"1"), ("volume/b", b"2")]);
    let volume = TempVolume::new();

    syncer(store).sync("mem://bucket/vol", &volume.endpoint()).unwrap();

    assert_eq!(volume.tree().keys().collect::<Vec<_>>(), vec!["a"]);
}

#[test]
fn file_store_round_trip() {
    let root = TempVolume::new();
    let store = Arc::new(FileStore::open(root.path()).unwrap());
    store.create_bucket("backups").unwrap();

    let source = TempVolume::new();
    source.write_file("db/main.sqlite", b"sqlite bytes");
    source.write_file("config.yml", b"a: 1");

    let syncer = syncer(Arc::clone(&store));
    let up = syncer
        .sync(&source.endpoint(), "file://backups/node1")
        .unwrap();
    assert_eq!(up.copied, 2);
    assert!(root.exists("backups/node1/db/main.sqlite"));

    let restored = TempVolume::new();
    let down = syncer
        .sync("file://backups/node1", &restored.endpoint())
        .unwrap();
    assert_eq!(down.copied, 2);
    assert_eq!(restored.tree(), source.tree());
}

#[test]
fn file_store_backup_with_delete_replaces_files_in_place() {
    let root = TempVolume::new();
    let store = Arc::new(FileStore::open(root.path()).unwrap());
    store.create_bucket("b").unwrap();

    let volume = TempVolume::new();
    let body = vec![b'n'; 200 * 1024];
    for i in 0..8 {
        store
            .put_object("b", &format!("p/d{i}/old.txt"), &mut &b"old"[..])
            .unwrap();
        volume.write_file(&format!("d{i}/new.txt"), &body);
    }

    let config = SyncConfig::new().with_delete(true).with_concurrency(8);
    let syncer = Syncer::new(config, Arc::clone(&store)).unwrap();
    for _ in 0..5 {
        let report = syncer.sync(&volume.endpoint(), "file://b/p").unwrap();
        assert_eq!(syncer.state(), SyncState::Done);
        assert_eq!((report.copied + report.deleted) as usize, report.planned);

        for i in 0..8 {
            assert!(root.exists(&format!("b/p/d{i}/new.txt")));
            assert!(!root.exists(&format!("b/p/d{i}/old.txt")));
        }

        // Put the stale entries back and force every file to be copied again.
        for i in 0..8 {
            store
                .put_object("b", &format!("p/d{i}/old.txt"), &mut &b"old"[..])
                .unwrap();
            volume.write_file(&format!("d{i}/new.txt"), &body[1..]);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn download_with_delete_mirrors_remote((remote, local) in overlapping_trees_strategy(8)) {
        let entries: Vec<(&str, &[u8])> = remote
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect();
        let store = seeded_store("bucket", "vol", &entries);
        let volume = TempVolume::with_tree(&local);
        for path in local.keys() {
            volume.set_mtime(path, at(1_000));
        }

        let syncer = Syncer::new(SyncConfig::new().with_delete(true), store).unwrap();
        syncer.sync("mem://bucket/vol", &volume.endpoint()).unwrap();

        prop_assert_eq!(volume.tree(), remote);
        let again = syncer.sync("mem://bucket/vol", &volume.endpoint()).unwrap();
        prop_assert_eq!(again.planned, 0);
    }

    #[test]
    fn upload_with_delete_mirrors_local((local, remote) in overlapping_trees_strategy(8)) {
        let entries: Vec<(&str, &[u8])> = remote
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect();
        let store = Arc::new(seeded_store("bucket", "vol", &entries));
        let volume = TempVolume::with_tree(&local);

        let syncer = Syncer::new(SyncConfig::new().with_delete(true), Arc::clone(&store)).unwrap();
        syncer.sync(&volume.endpoint(), "mem://bucket/vol").unwrap();

        prop_assert_eq!(store_tree(&store, "bucket", "vol"), local);
    }
}
