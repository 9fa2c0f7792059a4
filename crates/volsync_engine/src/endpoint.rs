//! Endpoint parsing: local directories and remote bucket URIs.

use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// A remote location of the form `scheme://bucket[/prefix]`.
///
/// The prefix is stored without leading or trailing `/`. Keys under the
/// location are `prefix/relative` (or just `relative` without a prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    scheme: String,
    bucket: String,
    prefix: String,
}

impl RemoteLocation {
    /// Returns the URI scheme, e.g. `s3` or `file`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the key prefix, without surrounding separators.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the prefix to list with: the prefix plus its trailing separator.
    ///
    /// Listing `backup/` rather than `backup` keeps `backup-old/x` out.
    pub fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    /// Builds the object key for a relative path.
    pub fn object_key(&self, relative_path: &str) -> String {
        if self.prefix.is_empty() {
            relative_path.to_string()
        } else {
            format!("{}/{}", self.prefix, relative_path)
        }
    }

    /// Strips the prefix from a listed key.
    ///
    /// Returns `None` for keys outside the prefix, for the prefix marker
    /// object itself, and for directory marker keys ending in `/`.
    pub fn relative_path<'a>(&self, key: &'a str) -> Option<&'a str> {
        let relative = key.strip_prefix(self.list_prefix().as_str())?;
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() || relative.ends_with('/') {
            None
        } else {
            Some(relative)
        }
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.bucket)?;
        if !self.prefix.is_empty() {
            write!(f, "/{}", self.prefix)?;
        }
        Ok(())
    }
}

/// One side of a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A directory on the local filesystem.
    Local(PathBuf),
    /// A bucket and prefix in an object store.
    Remote(RemoteLocation),
}

impl Endpoint {
    /// Parses an endpoint string.
    ///
    /// Anything with a `scheme://` head is remote; everything else is a
    /// local path. No I/O is performed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidEndpoint`] for an empty string or a
    /// remote URI without a bucket.
    pub fn parse(input: &str) -> SyncResult<Self> {
        if input.is_empty() {
            return Err(SyncError::invalid_endpoint(input, "empty endpoint"));
        }

        let Some((scheme, rest)) = split_scheme(input) else {
            return Ok(Endpoint::Local(PathBuf::from(input)));
        };

        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(SyncError::invalid_endpoint(input, "missing bucket name"));
        }

        Ok(Endpoint::Remote(RemoteLocation {
            scheme: scheme.to_ascii_lowercase(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        }))
    }

    /// Returns true for remote endpoints.
    pub fn is_remote(&self) -> bool {
        matches!(self, Endpoint::Remote(_))
    }

    /// Returns the local path, if this is a local endpoint.
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Endpoint::Local(path) => Some(path),
            Endpoint::Remote(_) => None,
        }
    }

    /// Returns the remote location, if this is a remote endpoint.
    pub fn as_remote(&self) -> Option<&RemoteLocation> {
        match self {
            Endpoint::Remote(location) => Some(location),
            Endpoint::Local(_) => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local(path) => write!(f, "{}", path.display()),
            Endpoint::Remote(location) => location.fmt(f),
        }
    }
}

/// Splits `scheme://rest` if the head is a valid URI scheme.
fn split_scheme(input: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = input.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}
