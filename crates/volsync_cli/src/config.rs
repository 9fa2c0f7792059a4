//! Daemon configuration loaded from environment variables.

use crate::schedule::{Schedule, ScheduleError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use volsync_engine::{Filter, SyncConfig, SyncResult, DEFAULT_CONCURRENCY};

/// Marker file written into the volume after the first successful restore.
pub const SENTINEL_FILENAME: &str = ".volsync_done";

/// Local root used when `VOLUME_PATH` is unset.
pub const DEFAULT_VOLUME_PATH: &str = "/data";

/// Directory backing `file://` remotes when `STORE_ROOT` is unset.
pub const DEFAULT_STORE_ROOT: &str = "/remote";

/// Container stop timeout used when `DOCKER_STOP_GRACE_PERIOD` is unset.
pub const DEFAULT_STOP_GRACE_PERIOD: Duration = Duration::from_secs(120);

/// Errors raised while loading the daemon configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// A variable is set to something unusable.
    #[error("invalid {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// What is wrong with the value.
        reason: String,
    },
}

/// Everything the daemon needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Remote endpoint URI (`S3_PATH`).
    pub remote: String,
    /// Backup schedule (`SYNC_SCHEDULE`).
    pub schedule: Schedule,
    /// Local volume root (`VOLUME_PATH`).
    pub volume_path: PathBuf,
    /// Container volume to stop around backups (`VOLUME_NAME`).
    pub volume_name: Option<String>,
    /// How long containers get to stop (`DOCKER_STOP_GRACE_PERIOD`).
    pub stop_grace_period: Duration,
    /// Whether stale destination entries are removed (`SYNC_DELETE`).
    pub delete_destination: bool,
    /// Transfer workers (`SYNC_CONCURRENCY`).
    pub concurrency: usize,
    /// Extra glob exclusions (`SYNC_EXCLUDE`).
    pub exclude: Vec<String>,
    /// Root directory for `file://` remotes (`STORE_ROOT`).
    pub store_root: PathBuf,
}

impl DaemonConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        let remote = get("S3_PATH").ok_or(ConfigError::Missing("S3_PATH"))?;
        let schedule = get("SYNC_SCHEDULE").ok_or(ConfigError::Missing("SYNC_SCHEDULE"))?;
        let schedule = Schedule::parse(&schedule).map_err(|e: ScheduleError| {
            ConfigError::Invalid {
                var: "SYNC_SCHEDULE",
                reason: e.to_string(),
            }
        })?;

        let stop_grace_period = match get("DOCKER_STOP_GRACE_PERIOD") {
            Some(value) => parse_duration(&value).map_err(|reason| ConfigError::Invalid {
                var: "DOCKER_STOP_GRACE_PERIOD",
                reason,
            })?,
            None => DEFAULT_STOP_GRACE_PERIOD,
        };

        let concurrency = get("SYNC_CONCURRENCY")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_CONCURRENCY);

        let exclude = get("SYNC_EXCLUDE")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|pattern| !pattern.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            remote,
            schedule,
            volume_path: get("VOLUME_PATH")
                .unwrap_or_else(|| DEFAULT_VOLUME_PATH.to_string())
                .into(),
            volume_name: get("VOLUME_NAME"),
            stop_grace_period,
            delete_destination: get("SYNC_DELETE").as_deref() == Some("true"),
            concurrency,
            exclude,
            store_root: get("STORE_ROOT")
                .unwrap_or_else(|| DEFAULT_STORE_ROOT.to_string())
                .into(),
        })
    }

    /// Path of the restore marker inside the volume.
    pub fn sentinel_path(&self) -> PathBuf {
        self.volume_path.join(SENTINEL_FILENAME)
    }

    /// Local root as an endpoint string.
    pub fn volume_endpoint(&self) -> String {
        self.volume_path.display().to_string()
    }

    /// Engine configuration for both restore and backup.
    ///
    /// # Errors
    ///
    /// Returns an error if an exclusion pattern is not a valid glob.
    pub fn sync_config(&self) -> SyncResult<SyncConfig> {
        Ok(SyncConfig::new()
            .with_concurrency(self.concurrency)
            .with_delete(self.delete_destination)
            .with_filter(sync_filter(&self.exclude)?))
    }
}

/// The sentinel exclusion combined with user-supplied globs.
pub fn sync_filter(exclude: &[String]) -> SyncResult<Filter> {
    Ok(Filter::exclude_suffix(SENTINEL_FILENAME).and(Filter::exclude_globs(exclude)?))
}

/// Parses a duration such as `30s`, `2m`, `1h30m`, `1.5h` or `500ms`.
///
/// Units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `0` is allowed.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let text = input.trim();
    if text.is_empty() {
        return Err("empty duration".into());
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut nanos = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_end == 0 {
            return Err(format!("expected a number in {input:?}"));
        }
        let value: f64 = rest[..number_end]
            .parse()
            .map_err(|_| format!("invalid number in {input:?}"))?;
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in {input:?}")),
            unit => return Err(format!("unknown unit {unit:?} in {input:?}")),
        };
        nanos += value * scale;
        rest = &rest[unit_end..];
    }

    Ok(Duration::from_nanos(nanos.round() as u64))
}
