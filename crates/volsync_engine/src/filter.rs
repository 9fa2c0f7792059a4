//! Path filters applied to both sides of a sync.

use crate::error::{SyncError, SyncResult};
use globset::{GlobBuilder, GlobSetBuilder};
use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&str) -> bool + Send + Sync;

/// A predicate deciding which relative paths take part in a sync.
///
/// A path is included in a snapshot only if the filter allows it. The same
/// filter is applied to both enumerators, so an excluded path can never be
/// planned for deletion on the destination side either.
///
/// Filters are cheap to clone and can be combined with [`Filter::and`].
///
/// # Example
///
/// ```rust
/// use volsync_engine::Filter;
///
/// let filter = Filter::exclude_suffix(".volsync_done")
///     .and(Filter::exclude_globs(["*.tmp"]).unwrap());
///
/// assert!(filter.allows("data/db.sqlite"));
/// assert!(!filter.allows(".volsync_done"));
/// assert!(!filter.allows("cache/x.tmp"));
/// ```
#[derive(Clone, Default)]
pub struct Filter {
    predicate: Option<Arc<Predicate>>,
}

impl Filter {
    /// A filter that includes every path.
    pub fn all() -> Self {
        Self::default()
    }

    /// Wraps an arbitrary predicate; `true` means include.
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Excludes every path ending with `suffix`.
    pub fn exclude_suffix(suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        Self::new(move |path| !path.ends_with(&suffix))
    }

    /// Excludes every path matching any of the glob patterns.
    ///
    /// `*` matches across `/`, so `*.tmp` excludes `a.tmp` and `dir/b.tmp`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if a pattern does not compile.
    pub fn exclude_globs<I, S>(patterns: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut count = 0usize;
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(|e| SyncError::InvalidConfig(format!("exclude pattern {pattern:?}: {e}")))?;
            builder.add(glob);
            count += 1;
        }
        if count == 0 {
            return Ok(Self::all());
        }

        let set = builder
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("exclude patterns: {e}")))?;
        Ok(Self::new(move |path| !set.is_match(path)))
    }

    /// Includes a path only if both filters include it.
    pub fn and(self, other: Filter) -> Self {
        match (self.predicate, other.predicate) {
            (None, None) => Self::all(),
            (Some(p), None) | (None, Some(p)) => Self { predicate: Some(p) },
            (Some(a), Some(b)) => Self::new(move |path| a(path) && b(path)),
        }
    }

    /// Returns true if `path` takes part in the sync.
    pub fn allows(&self, path: &str) -> bool {
        self.predicate.as_ref().is_none_or(|p| p(path))
    }

    /// Returns true if this filter includes every path.
    pub fn is_all(&self) -> bool {
        self.predicate.is_none()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            f.write_str("Filter(all)")
        } else {
            f.write_str("Filter(predicate)")
        }
    }
}
