//! In-memory store: useful for testing and runs that need no persistence.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use wayfarer_core::error::MemoryError;
use wayfarer_core::memory::{MemoryRecord, MemoryStore, StepRange};

/// A store that keeps records in a Vec, in append order.
#[derive(Clone)]
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<MemoryRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Err(MemoryError::Storage(format!(
                "record {} already exists",
                record.id
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn find_by_range(&self, range: StepRange) -> Result<Option<MemoryRecord>, MemoryError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.range == range).cloned())
    }

    async fn query_range(&self, range: StepRange) -> Result<Vec<MemoryRecord>, MemoryError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.range.overlaps(&range))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self.records.read().await.clone())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.records.read().await.len())
    }
}
