//! Memory trait: durable, append-only storage of consolidated summaries.
//!
//! A [`MemoryRecord`] is written once by the consolidator and never mutated.
//! Stores are queryable by step range; semantic search is not part of the
//! contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;

/// An inclusive range of step numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepRange {
    pub start: u32,
    pub end: u32,
}

impl StepRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn contains(&self, step: u32) -> bool {
        self.start <= step && step <= self.end
    }

    pub fn overlaps(&self, other: &StepRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl std::fmt::Display for StepRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A consolidated summary of a step range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub range: StepRange,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(range: StepRange, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            range,
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }
}

/// The core MemoryStore trait.
///
/// Implementations: in-memory (for testing and short runs), JSONL file.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Append a record. Records are never updated afterwards.
    async fn append(&self, record: MemoryRecord) -> std::result::Result<(), MemoryError>;

    /// The record covering exactly `range`, if any.
    async fn find_by_range(
        &self,
        range: StepRange,
    ) -> std::result::Result<Option<MemoryRecord>, MemoryError>;

    /// All records overlapping `range`, in creation order.
    async fn query_range(
        &self,
        range: StepRange,
    ) -> std::result::Result<Vec<MemoryRecord>, MemoryError>;

    /// Every record, in creation order.
    async fn all(&self) -> std::result::Result<Vec<MemoryRecord>, MemoryError>;

    /// Get total record count.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_range_is_inclusive() {
        let range = StepRange::new(0, 9);
        assert!(range.contains(0));
        assert!(range.contains(9));
        assert!(!range.contains(10));
        assert_eq!(range.len(), 10);
        assert_eq!(range.to_string(), "0-9");
    }

    #[test]
    fn step_range_normalizes_order() {
        assert_eq!(StepRange::new(5, 2), StepRange::new(2, 5));
    }

    #[test]
    fn overlap_detection() {
        let a = StepRange::new(0, 9);
        assert!(a.overlaps(&StepRange::new(9, 12)));
        assert!(!a.overlaps(&StepRange::new(10, 19)));
    }

    #[test]
    fn record_serialization() {
        let record = MemoryRecord::new(StepRange::new(0, 9), "Searched for flights");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("Searched for flights"));
        assert!(json.contains("\"start\":0"));
    }
}
