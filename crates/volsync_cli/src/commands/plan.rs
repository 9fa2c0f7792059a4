//! Dry-run plan command implementation.

use super::open_store_for;
use super::sync::SyncOptions;
use serde::Serialize;
use std::error::Error;
use volsync_engine::{PlannedSync, Syncer};

/// Plan output for JSON format.
#[derive(Debug, Serialize)]
pub struct PlanOutput {
    /// Source endpoint.
    pub source: String,
    /// Destination endpoint.
    pub destination: String,
    /// Transfer direction.
    pub direction: String,
    /// Entries found on the source side.
    pub source_entries: usize,
    /// Entries found on the destination side.
    pub destination_entries: usize,
    /// Paths that would be copied, sorted.
    pub copies: Vec<String>,
    /// Paths that would be deleted, sorted.
    pub deletes: Vec<String>,
}

impl PlanOutput {
    fn new(source: &str, destination: &str, planned: PlannedSync) -> Self {
        let plan = planned.plan.sorted();
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            direction: planned.route.direction.to_string(),
            source_entries: planned.source_entries,
            destination_entries: planned.destination_entries,
            copies: plan.copies,
            deletes: plan.deletes,
        }
    }

    fn render_text(&self) -> String {
        let mut out = format!(
            "{} -> {} ({})\n",
            self.source, self.destination, self.direction
        );
        for path in &self.copies {
            out.push_str(&format!("copy   {path}\n"));
        }
        for path in &self.deletes {
            out.push_str(&format!("delete {path}\n"));
        }
        out.push_str(&format!(
            "{} to copy, {} to delete ({} source entries, {} destination entries)",
            self.copies.len(),
            self.deletes.len(),
            self.source_entries,
            self.destination_entries
        ));
        out
    }
}

/// Runs the plan command.
pub fn run(
    source: &str,
    destination: &str,
    options: &SyncOptions,
    format: &str,
) -> Result<PlanOutput, Box<dyn Error>> {
    let store = open_store_for(source, destination, &options.store_root)?;
    let syncer = Syncer::new(options.sync_config()?, store)?;
    let output = PlanOutput::new(source, destination, syncer.plan(source, destination)?);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&output)?),
        "text" => println!("{}", output.render_text()),
        other => return Err(format!("unknown format {other:?} (expected text or json)").into()),
    }
    Ok(output)
}
