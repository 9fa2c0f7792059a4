//! # Volsync Testkit
//!
//! Test utilities for volsync.
//!
//! This crate provides:
//! - Temporary volume directories with content and mtime helpers
//! - Object store wrappers that inject failures or record concurrency
//! - Property-based generators for file trees
//!
//! ## Usage
//!
//! ```rust,ignore
//! use volsync_testkit::prelude::*;
//!
//! #[test]
//! fn restores_volume() {
//!     let volume = TempVolume::new();
//!     let store = seeded_store("bucket", "vol", &[("a.txt", b"hi")]);
//!     // ... run a sync into volume.path()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stores;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stores::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stores::*;
