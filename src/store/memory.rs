// src/store/memory.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::RwLock;

use super::{read_lock, write_lock, LogStore, RecordIndex};
use crate::error::StoreError;
use crate::record::{AttemptRecord, NewAttempt, RecordSummary};

#[derive(Debug, Default)]
struct Inner {
    index: RecordIndex,
    history: Vec<AttemptRecord>,
}

/// Process-local attempt log. Keeps every record in memory and nothing
/// survives a restart.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    inner: RwLock<Inner>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        read_lock(&self.inner).index.len()
    }

    pub fn is_empty(&self) -> bool {
        read_lock(&self.inner).index.is_empty()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, entry: NewAttempt) -> Result<AttemptRecord, StoreError> {
        let mut inner = write_lock(&self.inner);
        let record = inner.index.allocate(entry, Utc::now());
        inner.index.insert(record.clone());
        inner.history.push(record.clone());
        Ok(record)
    }

    async fn latest_success(&self, source: &str) -> Result<Option<AttemptRecord>, StoreError> {
        Ok(read_lock(&self.inner).index.latest_success(source).cloned())
    }

    async fn latest_failure(&self, source: &str) -> Result<Option<AttemptRecord>, StoreError> {
        Ok(read_lock(&self.inner).index.latest_failure(source).cloned())
    }

    async fn records(&self, source: &str) -> Result<Vec<AttemptRecord>, StoreError> {
        Ok(read_lock(&self.inner)
            .history
            .iter()
            .filter(|r| r.source == source)
            .cloned()
            .collect())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RecordSummary>, StoreError> {
        Ok(read_lock(&self.inner).index.recent(limit))
    }
}
