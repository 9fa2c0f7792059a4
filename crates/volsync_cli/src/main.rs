//! volsync CLI
//!
//! Keeps a container volume and an object-store prefix in sync.
//!
//! # Commands
//!
//! - `run` - Restore once, then back up on a schedule (configured from the environment)
//! - `sync` - Sync one endpoint into another, once
//! - `plan` - Show what a sync would do without transferring anything

mod commands;
mod config;
mod containers;
mod daemon;
mod schedule;

use clap::{Args, Parser, Subcommand};
use commands::sync::SyncOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use volsync_engine::DEFAULT_CONCURRENCY;

/// One-way sync between a local volume and an object store.
#[derive(Parser)]
#[command(name = "volsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SyncArgs {
    /// Source endpoint: a directory or scheme://bucket/prefix
    source: String,

    /// Destination endpoint: a directory or scheme://bucket/prefix
    destination: String,

    /// Delete destination entries that are missing from the source
    #[arg(short, long)]
    delete: bool,

    /// Number of concurrent transfers
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Glob pattern to exclude (repeatable)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Directory backing file:// remotes
    #[arg(long, env = "STORE_ROOT", default_value = config::DEFAULT_STORE_ROOT)]
    store_root: PathBuf,
}

impl SyncArgs {
    fn options(&self) -> SyncOptions {
        SyncOptions {
            delete: self.delete,
            concurrency: self.concurrency,
            exclude: self.exclude.clone(),
            store_root: self.store_root.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Restore the volume once, then back it up on SYNC_SCHEDULE
    Run,

    /// Sync SOURCE into DESTINATION once
    Sync {
        #[command(flatten)]
        args: SyncArgs,
    },

    /// Show what a sync would copy and delete
    Plan {
        #[command(flatten)]
        args: SyncArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run => commands::run::run()?,
        Commands::Sync { args } => {
            commands::sync::run(&args.source, &args.destination, &args.options())?;
        }
        Commands::Plan { args, format } => {
            commands::plan::run(&args.source, &args.destination, &args.options(), &format)?;
        }
        Commands::Version => {
            println!("volsync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
