//! Run configuration, state and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::ActionOutcome;
use crate::decision::Decision;
use crate::environment::{CaptureOptions, SnapshotSummary};
use crate::error::OutcomeError;
use crate::memory::MemoryRecord;

/// Settings consumed by the agent loop at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model identifier passed to the provider
    pub model: String,

    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    pub max_steps: u32,

    pub max_failures: u32,

    /// Wait before the next model call after a rate limit
    pub retry_delay_secs: u64,

    pub use_vision: bool,

    pub enable_memory: bool,

    pub max_actions_per_step: usize,

    pub memory_interval: u32,

    pub token_budget: usize,

    /// Reserve the context manager may borrow under pressure
    pub budget_headroom: usize,

    /// Total model invocations allowed per step
    pub decision_attempts: u32,

    /// Base of the exponential backoff between decision attempts
    pub decision_backoff_ms: u64,

    pub model_timeout_secs: u64,

    pub action_timeout_secs: u64,

    pub settle_timeout_ms: u64,

    pub capture: CaptureOptions,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            temperature: 0.0,
            max_tokens: None,
            max_steps: 100,
            max_failures: 3,
            retry_delay_secs: 10,
            use_vision: true,
            enable_memory: true,
            max_actions_per_step: 10,
            memory_interval: 10,
            token_budget: 128_000,
            budget_headroom: 8_000,
            decision_attempts: 3,
            decision_backoff_ms: 500,
            model_timeout_secs: 120,
            action_timeout_secs: 60,
            settle_timeout_ms: 5_000,
            capture: CaptureOptions::default(),
        }
    }
}

/// Run status. Everything except `Running` is terminal for one `run` call;
/// only `Paused` can be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Running,
    Done,
    AbortedByFailures,
    ExhaustedBySteps,
    Stopped,
    Paused,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running | Self::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::AbortedByFailures => "aborted-by-failures",
            Self::ExhaustedBySteps => "exhausted-by-steps",
            Self::Stopped => "stopped",
            Self::Paused => "paused",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One history entry: what was seen, decided and done in a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u32,

    /// `None` when every decision attempt failed to parse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    pub snapshot: SnapshotSummary,

    pub outcomes: Vec<ActionOutcome>,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn has_error(&self) -> bool {
        self.outcomes.iter().any(ActionOutcome::is_error)
    }

    pub fn is_done(&self) -> bool {
        self.outcomes.iter().any(|o| o.is_done)
    }
}

/// Mutable run state, owned by one agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Number of the next step to execute
    pub step: u32,

    pub consecutive_failures: u32,

    pub status: RunStatus,

    pub last_outcomes: Vec<ActionOutcome>,

    /// Append-only, ordered by step
    pub history: Vec<StepRecord>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            step: 0,
            consecutive_failures: 0,
            status: RunStatus::Running,
            last_outcomes: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Append a finished step and update the failure counter.
    ///
    /// The counter resets on a clean step and grows by exactly one
    /// otherwise, however many outcomes carried errors.
    pub fn record(&mut self, record: StepRecord) {
        debug_assert_eq!(record.step, self.step);
        if record.has_error() {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
        self.last_outcomes = record.outcomes.clone();
        self.history.push(record);
        self.step += 1;
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// What a finished (or paused) run hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub task_id: String,

    pub status: RunStatus,

    /// Number of steps executed
    pub steps: u32,

    /// Text of the `done` action, if the run finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    /// Set when the run ended on an unrecoverable failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<OutcomeError>,

    pub history: Vec<StepRecord>,

    pub memory_records: Vec<MemoryRecord>,
}

impl RunResult {
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentSnapshot;
    use crate::error::ErrorKind;

    fn record(step: u32, outcomes: Vec<ActionOutcome>) -> StepRecord {
        StepRecord {
            step,
            decision: None,
            snapshot: EnvironmentSnapshot::new("about:blank", "").summary(),
            outcomes,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn failure_counter_increments_once_per_step() {
        let mut state = RunState::new();
        state.record(record(
            0,
            vec![
                ActionOutcome::failure(ErrorKind::ActionExecutionFailure, "a"),
                ActionOutcome::failure(ErrorKind::StaleReference, "b"),
            ],
        ));
        assert_eq!(state.consecutive_failures, 1);
        state.record(record(1, vec![ActionOutcome::failure(ErrorKind::Timeout, "c")]));
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.step, 2);
    }

    #[test]
    fn failure_counter_resets_on_clean_step() {
        let mut state = RunState::new();
        state.record(record(0, vec![ActionOutcome::failure(ErrorKind::Timeout, "x")]));
        state.record(record(1, vec![ActionOutcome::ok("fine")]));
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.last_outcomes.len(), 1);
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&RunStatus::AbortedByFailures).unwrap();
        assert_eq!(json, "\"aborted-by-failures\"");
        assert_eq!(RunStatus::ExhaustedBySteps.to_string(), "exhausted-by-steps");
    }

    #[test]
    fn paused_is_resumable() {
        assert!(!RunStatus::Paused.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
        assert!(RunStatus::Done.is_terminal());
    }

    #[test]
    fn settings_defaults() {
        let settings = AgentSettings::default();
        assert_eq!(settings.max_steps, 100);
        assert_eq!(settings.max_failures, 3);
        assert_eq!(settings.memory_interval, 10);
        assert_eq!(settings.decision_attempts, 3);
        assert!(settings.use_vision);
    }
}
