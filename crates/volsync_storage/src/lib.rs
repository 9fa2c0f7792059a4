//! # volsync storage
//!
//! Object store capability trait and implementations for volsync.
//!
//! The sync engine never talks to a storage SDK directly. It consumes a
//! remote bucket through the four operations of [`ObjectStore`]:
//! paginated listing by prefix, fetching an object into a writer,
//! writing a reader into an object, and deleting an object.
//!
//! ## Design Principles
//!
//! - Stores are flat key/value namespaces grouped into buckets
//! - Keys always use `/` as the separator, no matter the host OS
//! - Listing metadata (size, last-modified) is authoritative; no follow-up fetch
//! - Must be `Send + Sync` so transfer workers can share one store
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing
//! - [`FileStore`] - Buckets backed by directories under a root path
//! - [`S3Store`] - Amazon S3 and S3-compatible services
//!
//! ## Example
//!
//! ```rust
//! use volsync_storage::{InMemoryStore, ObjectStore};
//!
//! let store = InMemoryStore::new();
//! store.create_bucket("backups");
//! store.put_object("backups", "vol/a.txt", &mut &b"hello"[..]).unwrap();
//!
//! let page = store.list_page("backups", "vol", None).unwrap();
//! assert_eq!(page.objects.len(), 1);
//! assert_eq!(page.objects[0].size, 5);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod s3;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use s3::S3Store;
pub use store::{ListPage, ObjectMeta, ObjectStore, DEFAULT_PAGE_SIZE};
