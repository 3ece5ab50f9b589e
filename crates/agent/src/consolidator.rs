//! Procedural memory: compressing older steps into durable summaries.
//!
//! Every `interval` steps the oldest unconsolidated step range is sent to
//! the model for summarization. The summary is appended to the
//! [`MemoryStore`] and replaces the range's entries in the context. A failed
//! summary leaves the entries in place; the range is tried again at the
//! next boundary.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use wayfarer_core::conversation::{ConversationEntry, EntryKind, Role};
use wayfarer_core::error::MemoryError;
use wayfarer_core::memory::{MemoryRecord, MemoryStore, StepRange};
use wayfarer_core::provider::{Provider, ProviderRequest};

use crate::context::ContextManager;

pub const SUMMARY_INSTRUCTION: &str = "You are the memory of a browser automation agent.";

const SUMMARY_RULES: &str = "Summarize the steps below into procedural memory for the agent. \
Keep what it did, where it is now, what worked, what failed, and any values it will need again \
(URLs, element descriptions, extracted data). Be concise and factual. Reply with the summary only.";

/// Longest single entry quoted in a summarization request.
const MAX_QUOTED_CHARS: usize = 2_000;

/// A successful consolidation.
#[derive(Debug, Clone)]
pub struct Consolidation {
    pub record: MemoryRecord,
    pub tokens_freed: usize,
    /// The record already existed and was only re-installed
    pub reused: bool,
}

pub struct MemoryConsolidator {
    provider: Arc<dyn Provider>,
    store: Arc<dyn MemoryStore>,
    model: String,
    interval: u32,
    timeout: Duration,
    /// First step not yet covered by a record
    next_start: u32,
}

impl std::fmt::Debug for MemoryConsolidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConsolidator")
            .field("store", &self.store.name())
            .field("interval", &self.interval)
            .field("next_start", &self.next_start)
            .finish()
    }
}

impl MemoryConsolidator {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn MemoryStore>,
        model: impl Into<String>,
        interval: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            model: model.into(),
            interval: interval.max(1),
            timeout,
            next_start: 0,
        }
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Whether `step` is an interval boundary.
    pub fn is_due(&self, step: u32) -> bool {
        step > 0 && step % self.interval == 0
    }

    /// Unconsolidated ranges before `step`, at most `interval` steps each.
    pub fn pending_ranges(&self, step: u32) -> Vec<StepRange> {
        let mut ranges = Vec::new();
        let mut start = self.next_start;
        while start < step {
            let end = (start + self.interval - 1).min(step - 1);
            ranges.push(StepRange::new(start, end));
            start = end + 1;
        }
        ranges
    }

    /// Consolidate `range` out of `context`.
    ///
    /// Returns `Ok(None)` when the context holds nothing for the range.
    /// Consolidating a range that already has a record re-installs that
    /// record's reference instead of summarizing again.
    pub async fn consolidate(
        &mut self,
        context: &mut ContextManager,
        range: StepRange,
    ) -> Result<Option<Consolidation>, MemoryError> {
        if let Some(record) = self.store.find_by_range(range).await? {
            debug!(range = %range, record = %record.id, "Range already consolidated");
            let tokens_freed = context.replace_range(&record);
            self.advance(range);
            return Ok(Some(Consolidation {
                record,
                tokens_freed,
                reused: true,
            }));
        }

        let entries = context.entries_in(range);
        if entries.is_empty() {
            debug!(range = %range, "Nothing left in context to consolidate");
            self.advance(range);
            return Ok(None);
        }

        let summary = self.summarize(range, &entries).await?;
        let record = MemoryRecord::new(range, summary);
        self.store.append(record.clone()).await?;
        let tokens_freed = context.replace_range(&record);
        self.advance(range);

        info!(range = %range, tokens_freed, "🧠 Consolidated steps into memory");
        Ok(Some(Consolidation {
            record,
            tokens_freed,
            reused: false,
        }))
    }

    /// Ask the model for a summary of `entries`.
    pub async fn summarize(&self, range: StepRange, entries: &[&ConversationEntry]) -> Result<String, MemoryError> {
        let transcript: String = entries
            .iter()
            .map(|e| {
                let who = match (e.role, &e.kind) {
                    (Role::Assistant, _) => "Agent decision",
                    (_, EntryKind::Outcome) => "Outcome",
                    (_, EntryKind::Correction) => "Correction",
                    (_, EntryKind::MemoryReference { .. }) => "Earlier memory",
                    _ => "Note",
                };
                let step = e.step.map(|s| format!(" (step {s})")).unwrap_or_default();
                format!("{who}{step}: {}\n", quote(&e.content))
            })
            .collect();

        let request = ProviderRequest::new(
            &self.model,
            vec![
                ConversationEntry::instruction(format!("{SUMMARY_INSTRUCTION} {SUMMARY_RULES}")),
                ConversationEntry::user(EntryKind::Note, format!("Steps {range}:\n{transcript}")),
            ],
        );

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| MemoryError::Summarization(format!("model did not answer within {}s", self.timeout.as_secs())))?
            .map_err(|e| MemoryError::Summarization(e.to_string()))?;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(MemoryError::Summarization("model returned an empty summary".into()));
        }
        Ok(summary.to_string())
    }

    fn advance(&mut self, range: StepRange) {
        self.next_start = self.next_start.max(range.end + 1);
    }
}

fn quote(text: &str) -> &str {
    match text.char_indices().nth(MAX_QUOTED_CHARS) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
