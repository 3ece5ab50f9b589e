//! Run log sinks: where run log records are written.

use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::RunLogError;
use crate::model::RunLogRecord;

/// Destination for run log records.
///
/// Records arrive in step order; implementations must not reorder them.
pub trait RunLogSink: Send + Sync {
    fn emit(&self, record: &RunLogRecord) -> Result<(), RunLogError>;
}

/// Discards everything.
pub struct NullRunLog;

impl RunLogSink for NullRunLog {
    fn emit(&self, _record: &RunLogRecord) -> Result<(), RunLogError> {
        Ok(())
    }
}

/// Keeps records in memory. Used by tests and by callers that render their
/// own report.
#[derive(Default)]
pub struct InMemoryRunLog {
    records: Mutex<Vec<RunLogRecord>>,
}

impl InMemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RunLogRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<RunLogRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl RunLogSink for InMemoryRunLog {
    fn emit(&self, record: &RunLogRecord) -> Result<(), RunLogError> {
        self.lock().push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonlRunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlRunLog {
    /// Open (or create) the log file in append mode.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, RunLogError> {
        let path = path.into();
        let io_err = |e: std::io::Error| RunLogError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        tracing::debug!(path = %path.display(), "Run log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLogSink for JsonlRunLog {
    fn emit(&self, record: &RunLogRecord) -> Result<(), RunLogError> {
        let line = serde_json::to_string(record)?;
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(file, "{line}")
            .and_then(|_| file.flush())
            .map_err(|e| RunLogError::Io {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
    }
}

/// `<log_dir>/run_<sanitized name>_<timestamp>_<id prefix>.jsonl`
///
/// The task id prefix keeps same-named tasks started within one second
/// apart.
pub fn run_log_path(log_dir: &Path, task_name: &str, task_id: &str, at: DateTime<Utc>) -> PathBuf {
    let sanitized = sanitize(task_name);
    let sanitized = if sanitized.is_empty() { "task".to_string() } else { sanitized };
    let id: String = sanitize(task_id).chars().take(8).collect();
    log_dir.join(format!("run_{sanitized}_{}_{id}.jsonl", at.format("%Y%m%d_%H%M%S")))
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wayfarer_core::run::RunStatus;

    fn finished() -> RunLogRecord {
        RunLogRecord::Finished {
            status: RunStatus::Done,
            steps: 2,
            final_text: Some("ok".into()),
            success: Some(true),
            fatal_error: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn in_memory_keeps_order() {
        let log = InMemoryRunLog::new();
        log.emit(&RunLogRecord::Started {
            task_id: "t".into(),
            task_name: "demo".into(),
            instruction: "do it".into(),
            model: "gpt-4o".into(),
            timestamp: Utc::now(),
        })
        .unwrap();
        log.emit(&finished()).unwrap();
        let kinds: Vec<_> = log.records().iter().map(|r| r.kind()).collect();
        assert_eq!(kinds, vec!["started", "finished"]);
    }

    #[test]
    fn jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.jsonl");
        let log = JsonlRunLog::create(&path).unwrap();
        log.emit(&finished()).unwrap();
        log.emit(&finished()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().all(|l| l.starts_with("{\"record\":\"finished\"")));
    }

    #[test]
    fn run_log_path_sanitizes_name() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        let path = run_log_path(
            Path::new("/tmp/logs"),
            "find flights: NYC→SFO",
            "3f2a9c1e-7b4d-4e8a-9c3f-1a2b3c4d5e6f",
            at,
        );
        assert_eq!(
            path,
            PathBuf::from("/tmp/logs/run_find_flights__NYC_SFO_20260301_123005_3f2a9c1e.jsonl")
        );
    }

    #[test]
    fn same_name_same_second_gets_distinct_paths() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        let dir = Path::new("/tmp/logs");
        let first = run_log_path(dir, "shop", "aaaaaaaa-1111", at);
        let second = run_log_path(dir, "shop", "bbbbbbbb-2222", at);
        assert_ne!(first, second);
    }
}
