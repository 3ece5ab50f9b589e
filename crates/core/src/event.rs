//! Domain event system: decoupled observation of a running agent.
//!
//! The agent loop publishes events as it moves through the step cycle.
//! Progress displays and tests subscribe without coupling to the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::ErrorKind;
use crate::memory::StepRange;
use crate::run::RunStatus;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run started (or resumed)
    RunStarted {
        task_id: String,
        instruction: String,
        timestamp: DateTime<Utc>,
    },

    /// A step began
    StepStarted {
        step: u32,
        timestamp: DateTime<Utc>,
    },

    /// The model produced a valid decision
    DecisionMade {
        step: u32,
        next_goal: String,
        action_count: usize,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// An action was dispatched
    ActionDispatched {
        step: u32,
        action: String,
        error: Option<ErrorKind>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A step finished and was recorded
    StepCompleted {
        step: u32,
        had_error: bool,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },

    /// A step range was compressed into a memory record
    MemoryConsolidated {
        record_id: String,
        range: StepRange,
        tokens_freed: usize,
        timestamp: DateTime<Utc>,
    },

    /// The context manager borrowed from its headroom
    BudgetDegraded {
        step: u32,
        effective_ceiling: usize,
        timestamp: DateTime<Utc>,
    },

    /// The run reached a terminal (or paused) status
    RunFinished {
        task_id: String,
        status: RunStatus,
        steps: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::ActionDispatched {
            step: 2,
            action: "click_element".into(),
            error: Some(ErrorKind::StaleReference),
            duration_ms: 42,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ActionDispatched { action, error, .. } => {
                assert_eq!(action, "click_element");
                assert_eq!(*error, Some(ErrorKind::StaleReference));
            }
            _ => panic!("Expected ActionDispatched event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::StepStarted {
            step: 0,
            timestamp: Utc::now(),
        });
    }
}
