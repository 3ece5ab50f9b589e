//! Audit logging: structured security event logging.
//!
//! Records the security-relevant things an agent run does: scope
//! violations, secret substitutions, and actions refused on stale element
//! references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub actor: String,
    pub target: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable security events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// An action was refused outside its allowed domains
    ScopeViolation { action: String },
    /// Navigation was refused by the task allow-list
    NavigationDenied { url: String },
    /// A sensitive value was substituted into parameters
    SecretSubstituted { name: String },
    /// An element index was absent from the current page state
    StaleReference { index: u32 },
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// Trait for audit log sinks (where events are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// In-memory audit logger that stores entries in a vector and forwards
/// them to its sinks.
pub struct AuditLogger {
    entries: Mutex<Vec<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.lock().len();
        f.debug_struct("AuditLogger")
            .field("entry_count", &count)
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks: Vec::new(),
        }
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sinks,
        }
    }

    /// A logger that forwards to `tracing`.
    pub fn tracing() -> Self {
        Self::with_sinks(vec![Box::new(TracingSink)])
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        actor: &str,
        target: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            target: target.into(),
            outcome,
            details,
        };

        self.lock().push(entry.clone());

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    /// Get entries filtered by outcome.
    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| &e.outcome == outcome)
            .cloned()
            .collect()
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            actor = %entry.actor,
            target = %entry.target,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn log_and_retrieve_entries() {
        let logger = AuditLogger::new();
        logger.log(
            AuditEvent::SecretSubstituted {
                name: "username".into(),
            },
            "task-1",
            "input_text",
            AuditOutcome::Success,
            None,
        );
        logger.log(
            AuditEvent::NavigationDenied {
                url: "https://evil.test".into(),
            },
            "task-1",
            "https://evil.test",
            AuditOutcome::Denied,
            Some("not in allow-list".into()),
        );

        assert_eq!(logger.count(), 2);
        let entries = logger.entries();
        assert_eq!(entries[1].target, "https://evil.test");
    }

    #[test]
    fn filter_by_outcome() {
        let logger = AuditLogger::new();
        logger.log(
            AuditEvent::SecretSubstituted {
                name: "password".into(),
            },
            "task-1",
            "input_text",
            AuditOutcome::Success,
            None,
        );
        logger.log(
            AuditEvent::ScopeViolation {
                action: "checkout".into(),
            },
            "task-1",
            "https://other.test",
            AuditOutcome::Denied,
            None,
        );
        logger.log(
            AuditEvent::StaleReference { index: 14 },
            "task-1",
            "click_element",
            AuditOutcome::Failure,
            None,
        );

        assert_eq!(logger.entries_by_outcome(&AuditOutcome::Denied).len(), 1);
        assert_eq!(logger.entries_by_outcome(&AuditOutcome::Failure).len(), 1);
    }

    #[test]
    fn audit_event_variants_serialize() {
        let event = AuditEvent::ScopeViolation {
            action: "checkout".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"scope_violation\""));
        let round_tripped: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped, event);
    }

    #[test]
    fn custom_sink_receives_events() {
        struct TestSink {
            received: Arc<Mutex<Vec<String>>>,
        }

        impl AuditSink for TestSink {
            fn record(&self, entry: &AuditEntry) {
                self.received.lock().unwrap().push(entry.target.clone());
            }
        }

        let received = Arc::new(Mutex::new(Vec::new()));
        let logger = AuditLogger::with_sinks(vec![Box::new(TestSink {
            received: received.clone(),
        })]);

        logger.log(
            AuditEvent::StaleReference { index: 3 },
            "task-1",
            "input_text",
            AuditOutcome::Failure,
            None,
        );

        let sink_entries = received.lock().unwrap();
        assert_eq!(sink_entries.as_slice(), ["input_text"]);
    }

    #[test]
    fn debug_format() {
        let logger = AuditLogger::tracing();
        let debug_str = format!("{logger:?}");
        assert!(debug_str.contains("entry_count"));
        assert!(debug_str.contains("sink_count: 1"));
    }
}
