//! Run logs for Wayfarer agents.
//!
//! Every step of a run is emitted as one serializable record to a
//! [`RunLogSink`]. The JSONL format is stable and replayable without
//! re-running the agent: [`read_run_log`] rebuilds the run from the file
//! alone.

pub mod model;
pub mod replay;
pub mod sink;

pub use model::RunLogRecord;
pub use replay::{ReplayedRun, read_run_log, render_replay};
pub use sink::{InMemoryRunLog, JsonlRunLog, NullRunLog, RunLogSink, run_log_path};

/// Errors from the run log subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RunLogError {
    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
