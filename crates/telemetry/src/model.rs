//! Data model for run log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wayfarer_core::error::OutcomeError;
use wayfarer_core::memory::MemoryRecord;
use wayfarer_core::run::{RunStatus, StepRecord};

/// One line of a run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum RunLogRecord {
    /// First line of every run (and of every resumed run).
    Started {
        task_id: String,
        task_name: String,
        instruction: String,
        model: String,
        timestamp: DateTime<Utc>,
    },

    /// One completed step: decision, snapshot summary, outcomes.
    Step(StepRecord),

    /// A step range was consolidated into a memory record.
    Consolidated(MemoryRecord),

    /// Last line of a run: always carries a terminal (or paused) status.
    Finished {
        status: RunStatus,
        steps: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fatal_error: Option<OutcomeError>,
        timestamp: DateTime<Utc>,
    },
}

impl RunLogRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Step(_) => "step",
            Self::Consolidated(_) => "consolidated",
            Self::Finished { .. } => "finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::environment::EnvironmentSnapshot;
    use wayfarer_core::{ActionOutcome, StepRange};

    #[test]
    fn step_record_is_tagged_inline() {
        let record = RunLogRecord::Step(StepRecord {
            step: 3,
            decision: None,
            snapshot: EnvironmentSnapshot::new("https://example.com", "Example").summary(),
            outcomes: vec![ActionOutcome::ok("clicked")],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["record"], "step");
        assert_eq!(json["step"], 3);
        assert_eq!(json["snapshot"]["location"], "https://example.com");
    }

    #[test]
    fn finished_record_carries_status() {
        let record = RunLogRecord::Finished {
            status: RunStatus::ExhaustedBySteps,
            steps: 5,
            final_text: None,
            success: None,
            fatal_error: None,
            timestamp: Utc::now(),
        };
        let line = serde_json::to_string(&record).unwrap();
        assert!(line.contains("\"status\":\"exhausted-by-steps\""));
        assert!(!line.contains("final_text"));
    }

    #[test]
    fn consolidated_record_kind() {
        let record = RunLogRecord::Consolidated(MemoryRecord::new(StepRange::new(0, 9), "x"));
        assert_eq!(record.kind(), "consolidated");
    }
}
