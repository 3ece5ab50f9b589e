//! Conversation entries: the units the context manager budgets and the
//! provider receives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::environment::VisualReference;
use crate::memory::StepRange;

/// Flat token cost charged for an attached visual reference.
pub const IMAGE_TOKEN_COST: usize = 800;

/// Per-entry framing overhead (role markers, separators).
const ENTRY_OVERHEAD_TOKENS: usize = 4;

/// The role of an entry's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions and the task
    System,
    /// Observations, outcomes, corrections
    User,
    /// Model decisions
    Assistant,
}

/// What an entry is, for logging and consolidation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    /// The permanent system + task entry
    Instruction,
    /// Current environment state
    State,
    /// A model decision
    Decision,
    /// Action outcomes fed back to the model
    Outcome,
    /// A "respond only in the required format" nudge
    Correction,
    /// Stands in for a consolidated step range
    MemoryReference { record_id: String, range: StepRange },
    /// Anything else
    Note,
}

/// A single entry in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub id: String,
    pub role: Role,
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<VisualReference>,

    /// Estimated token cost, fixed at creation and used for eviction
    pub tokens: usize,

    /// Step this entry belongs to; `None` for the instruction entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    pub kind: EntryKind,

    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    pub fn new(role: Role, kind: EntryKind, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            tokens: estimate_tokens(&content),
            content,
            image: None,
            step: None,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// The permanent instruction entry.
    pub fn instruction(content: impl Into<String>) -> Self {
        Self::new(Role::System, EntryKind::Instruction, content)
    }

    pub fn user(kind: EntryKind, content: impl Into<String>) -> Self {
        Self::new(Role::User, kind, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, EntryKind::Decision, content)
    }

    pub fn at_step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_image(mut self, image: VisualReference) -> Self {
        self.image = Some(image);
        self.tokens += IMAGE_TOKEN_COST;
        self
    }

    /// Drop the attached image, returning its cost to the budget.
    pub fn strip_image(&mut self) {
        if self.image.take().is_some() {
            self.tokens = self.tokens.saturating_sub(IMAGE_TOKEN_COST);
        }
    }

    /// Shorten the content so the entry costs at most `max_tokens`.
    pub fn truncate_to(&mut self, max_tokens: usize) {
        if self.tokens <= max_tokens {
            return;
        }
        self.strip_image();
        if self.tokens <= max_tokens {
            return;
        }
        let max_chars = max_tokens.saturating_sub(ENTRY_OVERHEAD_TOKENS + 4) * 4;
        let cut = floor_char_boundary(&self.content, max_chars);
        self.content.truncate(cut);
        self.content.push_str(" [...]");
        self.tokens = estimate_tokens(&self.content).min(max_tokens);
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == EntryKind::Instruction
    }
}

/// Rough token estimate: 4 chars ≈ 1 token, plus framing overhead.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4) + ENTRY_OVERHEAD_TOKENS
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut cut = max;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}
