//! Run log replay: rebuild a run from its JSONL log alone.

use std::fmt::Write as _;
use std::path::Path;

use wayfarer_core::memory::MemoryRecord;
use wayfarer_core::run::{RunStatus, StepRecord};

use crate::RunLogError;
use crate::model::RunLogRecord;

/// A run reconstructed from its log.
#[derive(Debug, Clone, Default)]
pub struct ReplayedRun {
    pub records: Vec<RunLogRecord>,
}

impl ReplayedRun {
    pub fn instruction(&self) -> Option<&str> {
        self.records.iter().find_map(|r| match r {
            RunLogRecord::Started { instruction, .. } => Some(instruction.as_str()),
            _ => None,
        })
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.iter().filter_map(|r| match r {
            RunLogRecord::Step(step) => Some(step),
            _ => None,
        })
    }

    pub fn memory_records(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.records.iter().filter_map(|r| match r {
            RunLogRecord::Consolidated(record) => Some(record),
            _ => None,
        })
    }

    /// Status of the last `finished` record. A resumed run logs several.
    pub fn status(&self) -> Option<RunStatus> {
        self.records.iter().rev().find_map(|r| match r {
            RunLogRecord::Finished { status, .. } => Some(*status),
            _ => None,
        })
    }
}

/// Parse a JSONL run log. Blank lines are skipped; any other unparsable
/// line is an error, since a replay from a damaged log would be misleading.
pub fn read_run_log(path: &Path) -> Result<ReplayedRun, RunLogError> {
    let content = std::fs::read_to_string(path).map_err(|e| RunLogError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parse_run_log(&content)
}

pub(crate) fn parse_run_log(content: &str) -> Result<ReplayedRun, RunLogError> {
    let mut records = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).map_err(|source| RunLogError::Parse {
            line: i + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(ReplayedRun { records })
}

fn eval_marker(evaluation: &str) -> &'static str {
    let lower = evaluation.to_lowercase();
    if lower.starts_with("success") {
        "👍"
    } else if lower.starts_with("failed") {
        "👎"
    } else {
        "🤷"
    }
}

/// Human-readable trajectory: per step the evaluation, next goal, actions
/// and errors, then the terminal status.
pub fn render_replay(run: &ReplayedRun) -> String {
    let mut out = String::new();
    if let Some(instruction) = run.instruction() {
        let _ = writeln!(out, "Task: {instruction}\n");
    }

    for step in run.steps() {
        let _ = writeln!(out, "Step {}:", step.step);
        let _ = writeln!(out, "Location: {}", step.snapshot.location);
        match &step.decision {
            Some(decision) => {
                let _ = writeln!(
                    out,
                    "Evaluation: {} {}",
                    eval_marker(&decision.evaluation_previous_goal),
                    decision.evaluation_previous_goal
                );
                let _ = writeln!(out, "Next Goal: {}", decision.next_goal);
                for (i, action) in decision.actions.iter().enumerate() {
                    let _ = writeln!(out, "Action {}/{}: {}", i + 1, decision.actions.len(), action);
                }
            }
            None => {
                let _ = writeln!(out, "Evaluation: (no valid decision)");
            }
        }
        for outcome in &step.outcomes {
            if let Some(error) = &outcome.error {
                let _ = writeln!(out, "Error: {error}");
            }
        }
        let _ = writeln!(out, "{}", "-".repeat(80));
    }

    for record in run.memory_records() {
        let _ = writeln!(out, "Memory {}: {}", record.range, record.summary);
    }

    match run.status() {
        Some(status) => {
            let _ = writeln!(out, "Status: {status}");
        }
        None => {
            let _ = writeln!(out, "Status: unknown (log has no finished record)");
        }
    }
    out
}
