//! Long-running mode: one restore at startup, then scheduled backups.

use crate::config::DaemonConfig;
use crate::containers::{restart, stop_attached, ContainerRuntime, StopFailure};
use chrono::Local;
use std::fs;
use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use volsync_engine::{CancelToken, SyncError, SyncReport, Syncer};
use volsync_storage::ObjectStore;

/// Errors from a daemon step.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The initial restore failed; the volume must not be used.
    #[error("initial restore failed: {0}")]
    Restore(#[source] SyncError),

    /// The restore marker could not be written.
    #[error("failed to write restore marker: {0}")]
    Sentinel(#[source] io::Error),

    /// Containers could not be stopped, so the backup was skipped.
    #[error("stopping containers: {0}")]
    Stop(#[source] StopFailure),

    /// The backup sync failed.
    #[error("backup failed: {0}")]
    Backup(#[source] SyncError),
}

/// What the startup restore did.
#[derive(Debug)]
pub enum RestoreOutcome {
    /// The marker was present; nothing ran.
    Skipped,
    /// The volume was restored and the marker written.
    Restored(SyncReport),
    /// Shutdown arrived mid-restore; no marker was written.
    Interrupted,
}

/// Ties the engine, container runtime and configuration together.
pub struct Daemon<S: ObjectStore, R: ContainerRuntime> {
    config: DaemonConfig,
    syncer: Syncer<S>,
    runtime: R,
    self_id: Option<String>,
}

impl<S: ObjectStore, R: ContainerRuntime> Daemon<S, R> {
    /// Creates a daemon. `self_id` is this process's container ID, if any.
    pub fn new(config: DaemonConfig, syncer: Syncer<S>, runtime: R, self_id: Option<String>) -> Self {
        Self {
            config,
            syncer,
            runtime,
            self_id,
        }
    }

    /// Gets the sync engine.
    pub fn syncer(&self) -> &Syncer<S> {
        &self.syncer
    }

    /// Restores the volume from the remote unless the marker exists.
    ///
    /// # Errors
    ///
    /// Any error here is fatal to the daemon.
    pub fn initial_restore(&self, cancel: &CancelToken) -> Result<RestoreOutcome, DaemonError> {
        let sentinel = self.config.sentinel_path();
        if sentinel.exists() {
            info!(sentinel = %sentinel.display(), "restore marker found, skipping initial restore");
            return Ok(RestoreOutcome::Skipped);
        }

        info!(
            remote = %self.config.remote,
            volume = %self.config.volume_path.display(),
            "restore marker not found, restoring volume"
        );
        let report = match self.syncer.sync_with_cancel(
            &self.config.remote,
            &self.config.volume_endpoint(),
            cancel,
        ) {
            Ok(report) => report,
            Err(SyncError::Cancelled) => {
                warn!("initial restore interrupted by shutdown, marker not written");
                return Ok(RestoreOutcome::Interrupted);
            }
            Err(e) => return Err(DaemonError::Restore(e)),
        };

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        fs::write(&sentinel, format!("restored at unix time {stamp}\n"))
            .map_err(DaemonError::Sentinel)?;

        info!(copied = report.copied, "initial restore completed");
        Ok(RestoreOutcome::Restored(report))
    }

    /// Runs one backup: stop containers, sync up, restart containers.
    ///
    /// Containers that were stopped are restarted even when the sync fails.
    ///
    /// # Errors
    ///
    /// Returns the stop or sync failure; the next tick starts over.
    pub fn backup(&self, cancel: &CancelToken) -> Result<SyncReport, DaemonError> {
        info!(remote = %self.config.remote, "starting scheduled backup");

        let stopped = match &self.config.volume_name {
            Some(volume) => stop_attached(
                &self.runtime,
                volume,
                self.self_id.as_deref(),
                self.config.stop_grace_period,
            ),
            None => {
                info!("VOLUME_NAME not set, not stopping containers");
                Ok(Vec::new())
            }
        };

        let (result, stopped) = match stopped {
            Ok(stopped) => {
                if !stopped.is_empty() {
                    info!(count = stopped.len(), "stopped containers");
                }
                let result = self
                    .syncer
                    .sync_with_cancel(&self.config.volume_endpoint(), &self.config.remote, cancel)
                    .map_err(DaemonError::Backup);
                (result, stopped)
            }
            Err(failure) => {
                let stopped = failure.stopped.clone();
                (Err(DaemonError::Stop(failure)), stopped)
            }
        };

        if !stopped.is_empty() {
            let started = restart(&self.runtime, &stopped);
            info!(started, total = stopped.len(), "restarted containers");
        }

        if result.is_ok() {
            info!("backup completed");
        }
        result
    }
}

impl<S, R> Daemon<S, R>
where
    S: ObjectStore + 'static,
    R: ContainerRuntime + 'static,
{
    /// Runs backups on schedule until `shutdown` flips to true.
    ///
    /// Each wait is computed from the wall clock after the previous backup
    /// finished, so runs missed while a backup was in progress are skipped.
    /// A backup in progress when shutdown arrives is cancelled through
    /// `cancel`.
    pub async fn serve(
        self: Arc<Self>,
        cancel: CancelToken,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(schedule = %self.config.schedule, "scheduler started");

        loop {
            let now = Local::now();
            let Some(delay) = self.config.schedule.delay_from(&now) else {
                warn!(schedule = %self.config.schedule, "schedule has no upcoming runs");
                let _ = shutdown.wait_for(|stop| *stop).await;
                break;
            };
            debug!(delay_secs = delay.as_secs(), "waiting for next backup");

            tokio::select! {
                _ = sleep(delay) => {
                    let daemon = Arc::clone(&self);
                    let token = cancel.clone();
                    match tokio::task::spawn_blocking(move || daemon.backup(&token)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => error!(error = %e, "scheduled backup failed"),
                        Err(e) => error!(error = %e, "backup task panicked"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }
        info!("scheduler stopped");
    }
}

/// Waits for SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
