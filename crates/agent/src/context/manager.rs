//! Bounded conversation held for the model.
//!
//! Entries are budgeted by their recorded token cost. When the running
//! total passes the ceiling, the oldest non-permanent entries are evicted
//! first-in first-out. The instruction entry at position 0 is never
//! evicted.

use tracing::{debug, warn};
use wayfarer_core::conversation::{ConversationEntry, EntryKind};
use wayfarer_core::memory::{MemoryRecord, StepRange};

/// Cap on the token cost of a memory reference entry.
const MAX_REFERENCE_TOKENS: usize = 400;

/// What an `append` did to the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendReport {
    /// Entries evicted to make room
    pub evicted: usize,
    /// Set when the append pushed the manager into its headroom
    pub degraded: Option<usize>,
    /// The appended entry had to be shortened to fit
    pub truncated: bool,
}

/// Owns the ordered conversation for one agent loop.
#[derive(Debug)]
pub struct ContextManager {
    entries: Vec<ConversationEntry>,
    total: usize,
    budget: usize,
    headroom: usize,
    ceiling: usize,
}

impl ContextManager {
    /// Create a manager around the permanent instruction entry.
    pub fn new(instruction: ConversationEntry, budget: usize, headroom: usize) -> Self {
        let mut manager = Self {
            total: instruction.tokens,
            entries: vec![instruction],
            budget,
            headroom,
            ceiling: budget,
        };
        if manager.total > manager.ceiling {
            manager.ceiling = (budget + headroom).max(manager.total);
            warn!(
                instruction_tokens = manager.total,
                budget, "Instruction alone exceeds the token budget"
            );
        }
        manager
    }

    /// Append an entry, evicting as needed to stay within the ceiling.
    ///
    /// When evicting everything evictable still cannot make room, the
    /// ceiling is raised into the reserved headroom and, if that is not
    /// enough either, the entry is truncated to fit.
    pub fn append(&mut self, mut entry: ConversationEntry) -> AppendReport {
        let mut report = AppendReport::default();
        let permanent = self.entries[0].tokens;

        if permanent + entry.tokens > self.ceiling {
            let extended = (self.budget + self.headroom).max(permanent);
            if extended > self.ceiling {
                self.ceiling = extended;
                report.degraded = Some(extended);
                warn!(
                    entry_tokens = entry.tokens,
                    effective_ceiling = extended,
                    "Context budget degraded into headroom"
                );
            }
            if permanent + entry.tokens > self.ceiling {
                entry.truncate_to(self.ceiling - permanent);
                report.truncated = true;
            }
        }

        self.total += entry.tokens;
        self.entries.push(entry);
        report.evicted = self.evict();
        report
    }

    /// Drop the oldest non-permanent entries until the total fits the
    /// ceiling. Returns how many entries were removed.
    pub fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.total > self.ceiling && self.entries.len() > 1 {
            let removed = self.entries.remove(1);
            self.total -= removed.tokens;
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, total = self.total, ceiling = self.ceiling, "Evicted context entries");
        }
        evicted
    }

    /// Leave degraded mode once the conversation fits the base budget again.
    pub fn relieve(&mut self) -> bool {
        if self.is_degraded() && self.total <= self.budget && self.entries[0].tokens <= self.budget {
            self.ceiling = self.budget;
            debug!(ceiling = self.ceiling, "Context budget restored");
            return true;
        }
        false
    }

    /// The conversation in order, instruction first.
    pub fn render(&self) -> Vec<ConversationEntry> {
        self.entries.clone()
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// Remove the most recent state entry. State descriptions only matter
    /// for the decision they were rendered for.
    pub fn remove_last_state(&mut self) -> Option<ConversationEntry> {
        let position = self.entries.iter().rposition(|e| e.kind == EntryKind::State)?;
        let removed = self.entries.remove(position);
        self.total -= removed.tokens;
        Some(removed)
    }

    /// Entries belonging to steps in `range`, in order.
    pub fn entries_in(&self, range: StepRange) -> Vec<&ConversationEntry> {
        self.entries
            .iter()
            .filter(|e| is_step_entry(e) && e.step.is_some_and(|s| range.contains(s)))
            .collect()
    }

    /// Replace every entry of `range` with one reference entry for
    /// `record`. Returns the tokens freed (negative growth counts as zero).
    ///
    /// Installing the same record twice leaves a single reference.
    pub fn replace_range(&mut self, record: &MemoryRecord) -> usize {
        let before = self.total;
        let range = record.range;

        let mut kept = Vec::with_capacity(self.entries.len());
        let mut removed_tokens = 0;
        for entry in self.entries.drain(..) {
            let in_range = is_step_entry(&entry) && entry.step.is_some_and(|s| range.contains(s));
            let same_reference = matches!(&entry.kind, EntryKind::MemoryReference { record_id, .. } if *record_id == record.id);
            if in_range || same_reference {
                removed_tokens += entry.tokens;
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        self.total -= removed_tokens;

        let mut reference = ConversationEntry::user(
            EntryKind::MemoryReference {
                record_id: record.id.clone(),
                range,
            },
            format!(
                "🧠 Memory of steps {range} (record {}):\n{}",
                record.id, record.summary
            ),
        );
        reference.truncate_to(MAX_REFERENCE_TOKENS);

        // References sit before any later step, ordered by range.
        let position = self
            .entries
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, e)| order_key(e) > range.end)
            .map(|(i, _)| i)
            .unwrap_or(self.entries.len());
        self.total += reference.tokens;
        self.entries.insert(position, reference);
        self.evict();

        before.saturating_sub(self.total)
    }

    pub fn total_tokens(&self) -> usize {
        self.total
    }

    /// The ceiling currently enforced: the budget, or budget plus headroom
    /// while degraded.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn is_degraded(&self) -> bool {
        self.ceiling > self.budget
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_step_entry(entry: &ConversationEntry) -> bool {
    !entry.is_permanent() && !matches!(entry.kind, EntryKind::MemoryReference { .. })
}

fn order_key(entry: &ConversationEntry) -> u32 {
    match &entry.kind {
        EntryKind::MemoryReference { range, .. } => range.end,
        _ => entry.step.unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::conversation::estimate_tokens;

    fn note(step: u32, chars: usize) -> ConversationEntry {
        ConversationEntry::user(EntryKind::Outcome, "x".repeat(chars)).at_step(step)
    }

    fn manager(budget: usize) -> ContextManager {
        ContextManager::new(ConversationEntry::instruction("rules"), budget, 50)
    }

    #[test]
    fn eviction_keeps_total_within_ceiling_and_instruction_first() {
        let mut ctx = manager(100);
        let mut evicted = 0;
        for step in 0..20 {
            evicted += ctx.append(note(step, 60)).evicted;
            assert!(ctx.total_tokens() <= ctx.ceiling());
            assert!(ctx.entries()[0].is_permanent());
        }
        assert!(evicted > 0);
        let total: usize = ctx.entries().iter().map(|e| e.tokens).sum();
        assert_eq!(total, ctx.total_tokens());
    }

    #[test]
    fn eviction_is_fifo() {
        let mut ctx = manager(60);
        for step in 0..5 {
            ctx.append(note(step, 40));
        }
        let steps: Vec<u32> = ctx.entries().iter().skip(1).filter_map(|e| e.step).collect();
        let mut sorted = steps.clone();
        sorted.sort_unstable();
        assert_eq!(steps, sorted);
        assert_eq!(steps.last(), Some(&4));
    }

    #[test]
    fn oversized_append_degrades_then_truncates() {
        let mut ctx = manager(100);
        let report = ctx.append(note(0, 2000));
        assert_eq!(report.degraded, Some(150));
        assert!(report.truncated);
        assert!(ctx.is_degraded());
        assert!(ctx.total_tokens() <= 150);
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn relieve_restores_budget() {
        let mut ctx = manager(100);
        ctx.append(note(0, 500));
        assert!(ctx.is_degraded());
        assert!(!ctx.relieve());

        let record = MemoryRecord::new(StepRange::new(0, 0), "short");
        ctx.replace_range(&record);
        assert!(ctx.relieve());
        assert_eq!(ctx.ceiling(), 100);
    }

    #[test]
    fn remove_last_state_returns_tokens() {
        let mut ctx = manager(1000);
        ctx.append(note(0, 10));
        ctx.append(ConversationEntry::user(EntryKind::State, "page").at_step(1));
        let before = ctx.total_tokens();
        let removed = ctx.remove_last_state().unwrap();
        assert_eq!(ctx.total_tokens(), before - removed.tokens);
        assert!(ctx.remove_last_state().is_none());
    }

    #[test]
    fn replace_range_installs_single_reference_in_order() {
        let mut ctx = manager(10_000);
        for step in 0..4 {
            ctx.append(note(step, 100));
        }
        let record = MemoryRecord::new(StepRange::new(0, 1), "did things");
        let freed = ctx.replace_range(&record);
        assert!(freed > 0);

        assert!(matches!(ctx.entries()[1].kind, EntryKind::MemoryReference { .. }));
        assert_eq!(ctx.entries()[2].step, Some(2));
        assert!(ctx.entries_in(StepRange::new(0, 1)).is_empty());

        let len = ctx.len();
        let total = ctx.total_tokens();
        assert_eq!(ctx.replace_range(&record), 0);
        assert_eq!(ctx.len(), len);
        assert_eq!(ctx.total_tokens(), total);
    }

    #[test]
    fn oversized_instruction_extends_ceiling() {
        let instruction = ConversationEntry::instruction("r".repeat(1000));
        let tokens = estimate_tokens(&"r".repeat(1000));
        let ctx = ContextManager::new(instruction, 100, 50);
        assert_eq!(ctx.ceiling(), tokens);
        assert!(ctx.is_degraded());
    }
}
