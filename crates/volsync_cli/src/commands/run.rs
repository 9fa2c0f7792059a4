//! Daemon command implementation.

use super::open_store;
use crate::config::DaemonConfig;
use crate::containers::{self_container_id, DockerCli};
use crate::daemon::{shutdown_signal, Daemon, RestoreOutcome};
use std::error::Error;
use std::sync::Arc;
use tokio::runtime::Builder;
use tokio::sync::watch;
use tracing::info;
use volsync_engine::{CancelToken, Endpoint, SyncError, Syncer};

/// Runs the daemon until SIGINT or SIGTERM.
///
/// A failed initial restore returns an error and the process exits. A
/// restore cut short by a signal exits cleanly without writing the marker.
pub fn run() -> Result<(), Box<dyn Error>> {
    let config = DaemonConfig::from_env()?;
    let location = match Endpoint::parse(&config.remote)? {
        Endpoint::Remote(location) => location,
        Endpoint::Local(_) => {
            return Err(SyncError::invalid_endpoint(&config.remote, "S3_PATH must be a remote URI").into())
        }
    };
    let store = open_store(&location, &config.store_root)?;
    let syncer = Syncer::new(config.sync_config()?, store)?;

    let self_id = self_container_id();
    info!(
        remote = %config.remote,
        volume = %config.volume_path.display(),
        self_id = self_id.as_deref().unwrap_or("unknown"),
        "starting volsync daemon"
    );
    let daemon = Arc::new(Daemon::new(config, syncer, DockerCli::new(), self_id));

    let runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async move {
        let cancel = CancelToken::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown requested");
            trigger.cancel();
            let _ = shutdown_tx.send(true);
        });

        let restore = {
            let daemon = Arc::clone(&daemon);
            let token = cancel.clone();
            tokio::task::spawn_blocking(move || daemon.initial_restore(&token)).await?
        };
        if let RestoreOutcome::Interrupted = restore? {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Ok(());
        }
        daemon.serve(cancel, shutdown_rx).await;
        Ok::<(), Box<dyn Error>>(())
    })?;

    info!("volsync daemon stopped");
    Ok(())
}
