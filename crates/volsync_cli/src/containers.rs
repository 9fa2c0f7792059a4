//! Stopping and restarting the containers that share the synced volume.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Length of the short container ID Docker uses as the default hostname.
pub const SHORT_ID_LEN: usize = 12;

/// Errors from the container runtime.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The runtime command could not be started.
    #[error("failed to run container runtime: {0}")]
    Io(#[from] io::Error),

    /// The runtime command ran and failed.
    #[error("`{command}` failed ({status}): {stderr}")]
    Command {
        /// Command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// A running container attached to the volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Full container ID.
    pub id: String,
    /// Container names, as reported by the runtime.
    pub names: String,
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", short_id(&self.id), self.names)
    }
}

/// The operations needed from a container runtime.
pub trait ContainerRuntime: Send + Sync {
    /// Lists running containers that mount `volume`.
    fn list_attached(&self, volume: &str) -> Result<Vec<ContainerInfo>, ContainerError>;

    /// Stops a container, killing it after `grace`.
    fn stop(&self, id: &str, grace: Duration) -> Result<(), ContainerError>;

    /// Starts a stopped container.
    fn start(&self, id: &str) -> Result<(), ContainerError>;
}

/// Stopping failed part way; `stopped` still needs restarting.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct StopFailure {
    /// Containers stopped before the failure.
    pub stopped: Vec<ContainerInfo>,
    /// What went wrong.
    #[source]
    pub source: ContainerError,
}

/// Returns the first [`SHORT_ID_LEN`] characters of an ID.
pub fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// Decides whether `container_id` is this process's own container.
///
/// Matches on equality, or when the shorter ID is at least
/// [`SHORT_ID_LEN`] characters and prefixes the longer one.
pub fn is_self(container_id: &str, self_id: &str) -> bool {
    if container_id == self_id {
        return true;
    }
    let (short, long) = if container_id.len() <= self_id.len() {
        (container_id, self_id)
    } else {
        (self_id, container_id)
    };
    short.len() >= SHORT_ID_LEN && long.starts_with(short)
}

/// Stops every container attached to `volume` except `self_id`.
///
/// Stops in listing order and gives up at the first failure.
pub fn stop_attached<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    volume: &str,
    self_id: Option<&str>,
    grace: Duration,
) -> Result<Vec<ContainerInfo>, StopFailure> {
    let attached = runtime
        .list_attached(volume)
        .map_err(|source| StopFailure {
            stopped: Vec::new(),
            source,
        })?;

    let mut stopped = Vec::new();
    for container in attached {
        if self_id.is_some_and(|me| is_self(&container.id, me)) {
            debug!(container = %container, "skipping own container");
            continue;
        }

        info!(container = %container, volume, "stopping container");
        if let Err(source) = runtime.stop(&container.id, grace) {
            return Err(StopFailure { stopped, source });
        }
        stopped.push(container);
    }
    Ok(stopped)
}

/// Starts each container; failures are logged and skipped.
///
/// Returns how many containers started.
pub fn restart<R: ContainerRuntime + ?Sized>(runtime: &R, containers: &[ContainerInfo]) -> usize {
    let mut started = 0;
    for container in containers {
        info!(container = %container, "restarting container");
        match runtime.start(&container.id) {
            Ok(()) => started += 1,
            Err(e) => warn!(container = %container, error = %e, "failed to restart container"),
        }
    }
    started
}

/// Reads this process's container ID from the hostname.
pub fn self_container_id() -> Option<String> {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// [`ContainerRuntime`] backed by the `docker` command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Uses `docker` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("docker"),
        }
    }

    /// Uses a specific client binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, ContainerError> {
        let output = Command::new(&self.binary).args(args).output()?;
        if !output.status.success() {
            return Err(ContainerError::Command {
                command: format!("{} {}", self.binary.display(), args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for DockerCli {
    fn list_attached(&self, volume: &str) -> Result<Vec<ContainerInfo>, ContainerError> {
        let filter = format!("volume={volume}");
        let output = self.run(&[
            "ps",
            "--no-trunc",
            "--filter",
            &filter,
            "--format",
            "{{.ID}}\t{{.Names}}",
        ])?;
        Ok(parse_ps_output(&output))
    }

    fn stop(&self, id: &str, grace: Duration) -> Result<(), ContainerError> {
        let seconds = grace.as_secs().to_string();
        self.run(&["stop", "--time", &seconds, id]).map(drop)
    }

    fn start(&self, id: &str) -> Result<(), ContainerError> {
        self.run(&["start", id]).map(drop)
    }
}

/// Parses `ID<TAB>NAMES` lines.
fn parse_ps_output(output: &str) -> Vec<ContainerInfo> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (id, names) = line.split_once('\t').unwrap_or((line, ""));
            Some(ContainerInfo {
                id: id.to_string(),
                names: names.to_string(),
            })
        })
        .collect()
}
