//! CLI command implementations.

pub mod plan;
pub mod run;
pub mod sync;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use volsync_engine::{RemoteLocation, Route};
use tracing::debug;
use volsync_storage::{FileStore, ObjectStore, S3Store};

/// A store chosen at runtime from the remote endpoint's scheme.
pub type DynStore = Arc<dyn ObjectStore>;

/// Opens the object store serving `location`.
///
/// - `s3://bucket/prefix` uses the S3 API with the default AWS
///   credential chain; the bucket must already exist
/// - `file://bucket/prefix` maps to `<store_root>/bucket/prefix`; the
///   bucket directory is created if missing
///
/// Other schemes are rejected.
pub fn open_store(location: &RemoteLocation, store_root: &Path) -> Result<DynStore, Box<dyn Error>> {
    match location.scheme() {
        "s3" => {
            debug!(bucket = location.bucket(), "opening S3 store");
            Ok(Arc::new(S3Store::connect()?))
        }
        "file" => {
            let store = FileStore::open(store_root)?;
            store.create_bucket(location.bucket())?;
            Ok(Arc::new(store))
        }
        other => Err(format!(
            "unsupported remote scheme {other:?} in {location}: expected s3:// or file://"
        )
        .into()),
    }
}

/// Opens the store for whichever side of `source -> destination` is remote.
pub fn open_store_for(
    source: &str,
    destination: &str,
    store_root: &Path,
) -> Result<DynStore, Box<dyn Error>> {
    let route = Route::resolve(source, destination)?;
    open_store(&route.remote, store_root)
}
