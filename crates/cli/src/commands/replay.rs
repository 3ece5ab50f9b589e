//! `wayfarer replay`: print the trajectory recorded in a run log.

use std::path::Path;

use wayfarer_telemetry::{read_run_log, render_replay};

pub fn run(log: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let replayed = read_run_log(log).map_err(|e| format!("Failed to read run log {}: {e}", log.display()))?;
    print!("{}", render_replay(&replayed));
    Ok(())
}
