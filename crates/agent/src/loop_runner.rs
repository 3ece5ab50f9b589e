//! The agent step loop: observe, consolidate, render, decide, act, record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use wayfarer_actions::{ActionRegistry, TaskScope};
use wayfarer_core::action::ActionOutcome;
use wayfarer_core::conversation::{ConversationEntry, EntryKind};
use wayfarer_core::decision::Decision;
use wayfarer_core::environment::{Environment, EnvironmentSnapshot};
use wayfarer_core::error::{ErrorKind, OutcomeError, ProviderError};
use wayfarer_core::event::{DomainEvent, EventBus};
use wayfarer_core::memory::{MemoryRecord, MemoryStore};
use wayfarer_core::provider::{Provider, ProviderRequest};
use wayfarer_core::run::{AgentSettings, RunResult, RunState, RunStatus, StepRecord};
use wayfarer_core::task::Task;
use wayfarer_memory::InMemoryStore;
use wayfarer_telemetry::{NullRunLog, RunLogRecord, RunLogSink};

use crate::consolidator::MemoryConsolidator;
use crate::context::{AppendReport, ContextManager, prompt};
use crate::control::{RunControl, RunSignal};
use crate::observer::EnvironmentObserver;
use crate::parser::parse_decision;

/// Longest rejected model output echoed back with a correction.
const MAX_REJECTED_TOKENS: usize = 300;

/// What the decide phase produced.
struct DecideOutcome {
    decision: Result<Decision, OutcomeError>,
    attempts: u32,
}

/// Drives one task against one environment.
///
/// State persists across `run` calls, so a paused run resumes where it
/// stopped. A run that reached a terminal status returns the same result on
/// every later call.
pub struct AgentLoop {
    task: Task,
    settings: AgentSettings,
    provider: Arc<dyn Provider>,
    registry: Arc<ActionRegistry>,
    scope: TaskScope,
    observer: EnvironmentObserver,
    context: ContextManager,
    consolidator: Option<MemoryConsolidator>,
    run_log: Arc<dyn RunLogSink>,
    event_bus: Arc<EventBus>,
    control: RunControl,
    state: RunState,

    /// Wait owed before the next model call after a rate limit
    pending_delay: Option<Duration>,
    /// Set under budget pressure; consolidate at the next step regardless
    /// of the interval
    force_consolidation: bool,
    final_text: Option<String>,
    success: Option<bool>,
    fatal_error: Option<OutcomeError>,
    memory_records: Vec<MemoryRecord>,
}

impl AgentLoop {
    pub fn new(
        task: Task,
        settings: AgentSettings,
        provider: Arc<dyn Provider>,
        registry: Arc<ActionRegistry>,
    ) -> Self {
        let instruction = prompt::system_prompt(
            &task,
            &registry.describe(),
            settings.max_actions_per_step,
            settings.use_vision,
        );
        let context = ContextManager::new(
            ConversationEntry::instruction(instruction),
            settings.token_budget,
            settings.budget_headroom,
        );
        let observer = EnvironmentObserver::new(
            settings.capture.clone(),
            Duration::from_millis(settings.settle_timeout_ms),
        );
        let consolidator = settings.enable_memory.then(|| {
            MemoryConsolidator::new(
                provider.clone(),
                Arc::new(InMemoryStore::new()),
                &settings.model,
                settings.memory_interval,
                Duration::from_secs(settings.model_timeout_secs),
            )
        });

        Self {
            scope: TaskScope::from_task(&task),
            task,
            provider,
            registry,
            observer,
            context,
            consolidator,
            run_log: Arc::new(NullRunLog),
            event_bus: Arc::new(EventBus::default()),
            control: RunControl::new(),
            state: RunState::new(),
            pending_delay: None,
            force_consolidation: false,
            final_text: None,
            success: None,
            fatal_error: None,
            memory_records: Vec::new(),
            settings,
        }
    }

    /// Use `store` for memory records. Ignored when memory is disabled.
    pub fn with_memory(mut self, store: Arc<dyn MemoryStore>) -> Self {
        if self.settings.enable_memory {
            self.consolidator = Some(MemoryConsolidator::new(
                self.provider.clone(),
                store,
                &self.settings.model,
                self.settings.memory_interval,
                Duration::from_secs(self.settings.model_timeout_secs),
            ));
        }
        self
    }

    pub fn with_run_log(mut self, run_log: Arc<dyn RunLogSink>) -> Self {
        self.run_log = run_log;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    /// Handle for pausing or stopping this loop from elsewhere.
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Run until the task is done, a limit is hit, or a pause or stop
    /// signal is observed at a step boundary.
    pub async fn run(&mut self, env: &mut dyn Environment, max_steps: u32) -> RunResult {
        if self.state.status.is_terminal() {
            return self.result();
        }
        if self.state.status == RunStatus::Paused {
            info!(task = %self.task.name, step = self.state.step, "▶️ Resuming run");
            self.control.resume();
            self.state.status = RunStatus::Running;
        }

        info!(task = %self.task.name, max_steps, "🚀 Starting task: {}", self.task.instruction);
        self.emit(RunLogRecord::Started {
            task_id: self.task.id.clone(),
            task_name: self.task.name.clone(),
            instruction: self.task.instruction.clone(),
            model: self.settings.model.clone(),
            timestamp: Utc::now(),
        });
        self.event_bus.publish(DomainEvent::RunStarted {
            task_id: self.task.id.clone(),
            instruction: self.task.instruction.clone(),
            timestamp: Utc::now(),
        });

        let status = loop {
            match self.control.signal() {
                RunSignal::Stop => {
                    info!(step = self.state.step, "⏹️ Stop requested");
                    break RunStatus::Stopped;
                }
                RunSignal::Pause => {
                    info!(step = self.state.step, "⏸️ Pause requested");
                    break RunStatus::Paused;
                }
                RunSignal::Run => {}
            }

            if self.state.step >= max_steps {
                break RunStatus::ExhaustedBySteps;
            }

            if let Err(fatal) = self.step(env, max_steps).await {
                error!(step = self.state.step, error = %fatal.message, "❌ Environment unreachable, aborting run");
                self.fatal_error = Some(fatal);
                break RunStatus::AbortedByFailures;
            }

            if self.state.history.last().is_some_and(StepRecord::is_done) {
                break RunStatus::Done;
            }
            let fatal = self
                .state
                .last_outcomes
                .iter()
                .filter_map(|o| o.error.as_ref())
                .find(|e| e.kind.is_fatal())
                .cloned();
            if let Some(fatal) = fatal {
                error!(step = self.state.step - 1, error = %fatal.message, "❌ Environment unreachable, aborting run");
                self.fatal_error = Some(fatal);
                break RunStatus::AbortedByFailures;
            }
            if self.state.consecutive_failures >= self.settings.max_failures {
                error!(
                    failures = self.state.consecutive_failures,
                    "❌ Stopping due to {} consecutive failures", self.settings.max_failures
                );
                break RunStatus::AbortedByFailures;
            }
            if self.state.step >= max_steps {
                break RunStatus::ExhaustedBySteps;
            }
        };

        self.state.status = status;
        match status {
            RunStatus::Done => info!(steps = self.state.step, "✅ Task completed"),
            RunStatus::ExhaustedBySteps => warn!(steps = self.state.step, "❌ Failed to complete task in maximum steps"),
            _ => info!(steps = self.state.step, status = %status, "Run finished"),
        }

        self.emit(RunLogRecord::Finished {
            status,
            steps: self.state.step,
            final_text: self.final_text.clone(),
            success: self.success,
            fatal_error: self.fatal_error.clone(),
            timestamp: Utc::now(),
        });
        self.event_bus.publish(DomainEvent::RunFinished {
            task_id: self.task.id.clone(),
            status,
            steps: self.state.step,
            timestamp: Utc::now(),
        });
        self.result()
    }

    /// Execute one step. Only a failure to observe the environment is
    /// returned as an error; every other failure is recorded as an outcome.
    async fn step(&mut self, env: &mut dyn Environment, max_steps: u32) -> Result<(), OutcomeError> {
        let step = self.state.step;
        let started_at = Utc::now();
        info!(step, "📍 Step {}", step + 1);
        self.event_bus.publish(DomainEvent::StepStarted {
            step,
            timestamp: started_at,
        });

        let snapshot = self
            .observer
            .capture(env)
            .await
            .map_err(|e| OutcomeError::new(e.kind(), e.to_string()))?;

        self.maybe_consolidate(step).await;

        // Typed secrets can echo back through field values.
        let description = self
            .scope
            .sensitive
            .redact(&prompt::state_description(&snapshot, step, max_steps));
        let mut state_entry = ConversationEntry::user(EntryKind::State, description).at_step(step);
        if self.settings.use_vision
            && let Some(visual) = &snapshot.visual
        {
            state_entry = state_entry.with_image(visual.clone());
        }
        let report = self.context.append(state_entry);
        self.on_append(step, report);

        let decided = self.decide(step).await;
        self.context.remove_last_state();

        let outcomes = match &decided.decision {
            Ok(decision) => {
                info!(step, "👍 Eval: {}", decision.evaluation_previous_goal);
                info!(step, "🧠 Memory: {}", decision.memory);
                info!(step, "🎯 Next goal: {}", decision.next_goal);
                self.event_bus.publish(DomainEvent::DecisionMade {
                    step,
                    next_goal: decision.next_goal.clone(),
                    action_count: decision.actions.len(),
                    attempts: decided.attempts,
                    timestamp: Utc::now(),
                });
                let entry = ConversationEntry::assistant(decision_json(decision)).at_step(step);
                let report = self.context.append(entry);
                self.on_append(step, report);

                self.act(step, decision, env).await
            }
            Err(failure) => {
                warn!(step, kind = %failure.kind, attempts = decided.attempts, "No usable decision: {}", failure.message);
                vec![ActionOutcome::failure(failure.kind, failure.message.clone()).for_action("decision")]
            }
        };

        if let Some(summary) = prompt::outcome_summary(step, &snapshot.location, &outcomes) {
            let report = self
                .context
                .append(ConversationEntry::user(EntryKind::Outcome, summary).at_step(step));
            self.on_append(step, report);
        }

        self.record(step, decided.decision.ok(), &snapshot, outcomes, started_at);
        Ok(())
    }

    /// Consolidate every pending range when the step is an interval
    /// boundary or budget pressure forced it. Stops at the first failure;
    /// the rest is tried again at the next boundary.
    async fn maybe_consolidate(&mut self, step: u32) {
        let Some(consolidator) = self.consolidator.as_mut() else {
            return;
        };
        let forced = std::mem::take(&mut self.force_consolidation);
        if !forced && !consolidator.is_due(step) {
            return;
        }

        let mut done = Vec::new();
        for range in consolidator.pending_ranges(step) {
            match consolidator.consolidate(&mut self.context, range).await {
                Ok(Some(consolidation)) => done.push((consolidation.record, consolidation.tokens_freed)),
                Ok(None) => {}
                Err(e) => {
                    warn!(step, range = %range, error = %e, "Memory consolidation failed, retrying at next boundary");
                    break;
                }
            }
        }

        for (record, tokens_freed) in done {
            self.emit(RunLogRecord::Consolidated(record.clone()));
            self.event_bus.publish(DomainEvent::MemoryConsolidated {
                record_id: record.id.clone(),
                range: record.range,
                tokens_freed,
                timestamp: Utc::now(),
            });
            if !self.memory_records.iter().any(|r| r.id == record.id) {
                self.memory_records.push(record);
            }
        }

        if self.context.relieve() {
            info!(step, "Context budget back to normal");
        }
    }

    /// Ask the model for a decision, correcting and retrying malformed
    /// output up to `decision_attempts` calls in total.
    async fn decide(&mut self, step: u32) -> DecideOutcome {
        let attempts_allowed = self.settings.decision_attempts.max(1);
        let catalog = self.registry.catalog();
        let mut last_error = String::new();

        for attempt in 1..=attempts_allowed {
            if let Some(delay) = self.pending_delay.take() {
                info!(step, delay_secs = delay.as_secs(), "Rate limited, waiting before the next model call");
                tokio::time::sleep(delay).await;
            }

            let request = ProviderRequest::new(&self.settings.model, self.context.render())
                .with_temperature(self.settings.temperature)
                .with_max_tokens(self.settings.max_tokens);
            let timeout = Duration::from_secs(self.settings.model_timeout_secs);

            let raw = match tokio::time::timeout(timeout, self.provider.complete(request)).await {
                Ok(Ok(response)) => response.content,
                Ok(Err(e)) => {
                    if let ProviderError::RateLimited { retry_after_secs } = &e {
                        let delay = self.settings.retry_delay_secs.max(*retry_after_secs);
                        self.pending_delay = Some(Duration::from_secs(delay));
                    }
                    warn!(step, attempt, error = %e, "Model call failed");
                    return DecideOutcome {
                        decision: Err(OutcomeError::new(e.kind(), e.to_string())),
                        attempts: attempt,
                    };
                }
                Err(_) => {
                    warn!(step, attempt, timeout_secs = timeout.as_secs(), "Model call timed out");
                    return DecideOutcome {
                        decision: Err(OutcomeError::new(
                            ErrorKind::Timeout,
                            format!("model did not answer within {}s", timeout.as_secs()),
                        )),
                        attempts: attempt,
                    };
                }
            };

            match parse_decision(&raw, &catalog, self.settings.max_actions_per_step) {
                Ok(decision) => {
                    return DecideOutcome {
                        decision: Ok(decision),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!(step, attempt, error = %e, "Could not parse model output");
                    last_error = e.to_string();
                    if attempt == attempts_allowed {
                        break;
                    }

                    let mut rejected = ConversationEntry::assistant(raw).at_step(step);
                    rejected.truncate_to(MAX_REJECTED_TOKENS);
                    let report = self.context.append(rejected);
                    self.on_append(step, report);
                    let correction = format!("{e}. {}", prompt::CORRECTION);
                    let report = self
                        .context
                        .append(ConversationEntry::user(EntryKind::Correction, correction).at_step(step));
                    self.on_append(step, report);

                    let backoff = self
                        .settings
                        .decision_backoff_ms
                        .saturating_mul(1u64 << (attempt - 1).min(16));
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }

        DecideOutcome {
            decision: Err(OutcomeError::new(
                ErrorKind::DecisionParseFailure,
                format!("no valid decision after {attempts_allowed} attempts: {last_error}"),
            )),
            attempts: attempts_allowed,
        }
    }

    /// Dispatch the decision's actions in order until one interrupts the
    /// sequence or marks the task done.
    async fn act(&mut self, step: u32, decision: &Decision, env: &mut dyn Environment) -> Vec<ActionOutcome> {
        let total = decision.actions.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, invocation) in decision.actions.iter().enumerate() {
            info!(step, action = %invocation.name, "🛠️ Action {}/{}: {}", i + 1, total, invocation);
            let started = Instant::now();
            let outcome = self.registry.dispatch(invocation, env, &self.scope).await;
            self.event_bus.publish(DomainEvent::ActionDispatched {
                step,
                action: invocation.name.clone(),
                error: outcome.error_kind(),
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            let stop_done = outcome.is_done;
            let stop_interrupt = outcome.interrupts_sequence;
            if stop_done {
                self.final_text = outcome.content.clone();
                self.success = outcome.success;
                info!(step, success = ?outcome.success, "📄 Result: {}", outcome.content.as_deref().unwrap_or(""));
            }
            outcomes.push(outcome);

            if stop_done {
                break;
            }
            if stop_interrupt && i + 1 < total {
                debug!(step, skipped = total - i - 1, "Environment changed, skipping remaining actions");
                break;
            }
        }
        outcomes
    }

    fn record(
        &mut self,
        step: u32,
        decision: Option<Decision>,
        snapshot: &EnvironmentSnapshot,
        outcomes: Vec<ActionOutcome>,
        started_at: chrono::DateTime<Utc>,
    ) {
        let record = StepRecord {
            step,
            decision,
            snapshot: snapshot.summary(),
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };
        let had_error = record.has_error();
        self.emit(RunLogRecord::Step(record.clone()));
        self.state.record(record);

        if had_error {
            warn!(step, failures = self.state.consecutive_failures, "Step finished with errors");
        }
        self.event_bus.publish(DomainEvent::StepCompleted {
            step,
            had_error,
            consecutive_failures: self.state.consecutive_failures,
            timestamp: Utc::now(),
        });
    }

    fn on_append(&mut self, step: u32, report: AppendReport) {
        if let Some(effective_ceiling) = report.degraded {
            warn!(step, effective_ceiling, "Context degraded, consolidating early");
            self.force_consolidation = true;
            self.event_bus.publish(DomainEvent::BudgetDegraded {
                step,
                effective_ceiling,
                timestamp: Utc::now(),
            });
        }
    }

    fn emit(&self, record: RunLogRecord) {
        if let Err(e) = self.run_log.emit(&record) {
            warn!(record = record.kind(), error = %e, "Failed to write run log");
        }
    }

    fn result(&self) -> RunResult {
        RunResult {
            task_id: self.task.id.clone(),
            status: self.state.status,
            steps: self.state.step,
            final_text: self.final_text.clone(),
            success: self.success,
            fatal_error: self.fatal_error.clone(),
            history: self.state.history.clone(),
            memory_records: self.memory_records.clone(),
        }
    }
}

/// The decision as the model should see its own past output.
fn decision_json(decision: &Decision) -> String {
    let actions: Vec<serde_json::Value> = decision
        .actions
        .iter()
        .map(|a| {
            let mut item = serde_json::Map::new();
            item.insert(a.name.clone(), serde_json::Value::Object(a.params.clone()));
            serde_json::Value::Object(item)
        })
        .collect();
    serde_json::json!({
        "current_state": {
            "evaluation_previous_goal": decision.evaluation_previous_goal,
            "memory": decision.memory,
            "next_goal": decision.next_goal,
        },
        "action": actions,
    })
    .to_string()
}
