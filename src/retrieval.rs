// src/retrieval.rs
//! "Latest known state of source X", success before failure.

use std::sync::Arc;

use crate::error::StoreError;
use crate::record::{AttemptRecord, RecordSummary};
use crate::store::LogStore;

/// The three answers a query can get.
#[derive(Debug, Clone, PartialEq)]
pub enum Latest {
    /// Highest-id success; wins over any later failure.
    Data(AttemptRecord),
    /// No success ever; highest-id failure.
    LastAttemptFailed(AttemptRecord),
    NoData,
}

#[derive(Clone)]
pub struct RetrievalService {
    store: Arc<dyn LogStore>,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    pub async fn latest(&self, source: &str) -> Result<Latest, StoreError> {
        if let Some(rec) = self.store.latest_success(source).await? {
            return Ok(Latest::Data(rec));
        }
        if let Some(rec) = self.store.latest_failure(source).await? {
            return Ok(Latest::LastAttemptFailed(rec));
        }
        Ok(Latest::NoData)
    }

    /// Newest-first summaries across sources, without payloads.
    pub async fn recent(&self, limit: usize) -> Result<Vec<RecordSummary>, StoreError> {
        self.store.recent(limit).await
    }
}
