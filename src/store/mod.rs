// src/store/mod.rs
//! Append-only attempt log.
//!
//! Both backends share one in-memory [`RecordIndex`] holding only the latest
//! success and failure per source plus payload-free summaries:
//! - [`MemoryLogStore`]: process-local, used in tests and when no path is configured.
//! - [`JsonlLogStore`]: one JSON object per line, replayed on open; full
//!   history is read back from the file.
//!
//! Writes are serialized at the store boundary; a record becomes visible to
//! readers only once it is fully written and indexed.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlLogStore;
pub use memory::MemoryLogStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::record::{AttemptRecord, NewAttempt, RecordSummary};

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Assign id + timestamp and durably append. Never touches earlier records.
    async fn append(&self, entry: NewAttempt) -> Result<AttemptRecord, StoreError>;

    /// Highest-id success for `source`.
    async fn latest_success(&self, source: &str) -> Result<Option<AttemptRecord>, StoreError>;

    /// Highest-id failure for `source`.
    async fn latest_failure(&self, source: &str) -> Result<Option<AttemptRecord>, StoreError>;

    /// All records of `source` in id order, payloads included.
    async fn records(&self, source: &str) -> Result<Vec<AttemptRecord>, StoreError>;

    /// Up to `limit` summaries across all sources, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<RecordSummary>, StoreError>;
}

#[derive(Debug, Default, Clone)]
struct SourceSlots {
    latest_success: Option<AttemptRecord>,
    latest_failure: Option<AttemptRecord>,
}

/// Summaries in id order plus the latest success/failure record per source.
/// Payloads of older records are not kept.
#[derive(Debug)]
pub struct RecordIndex {
    summaries: Vec<RecordSummary>,
    by_source: HashMap<String, SourceSlots>,
    next_id: u64,
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self {
            summaries: Vec::new(),
            by_source: HashMap::new(),
            next_id: 1,
        }
    }
}

impl RecordIndex {
    /// Reserve the next id and stamp `entry`. The timestamp never goes
    /// backwards relative to the last indexed record.
    pub fn allocate(&mut self, entry: NewAttempt, now: DateTime<Utc>) -> AttemptRecord {
        let id = self.next_id;
        self.next_id += 1;
        let timestamp = match self.summaries.last() {
            Some(prev) if prev.timestamp > now => prev.timestamp,
            _ => now,
        };
        AttemptRecord {
            id,
            source: entry.source,
            timestamp,
            status: entry.status,
        }
    }

    /// Index a record. Records whose id does not exceed the last indexed id are
    /// rejected (returns false).
    pub fn insert(&mut self, record: AttemptRecord) -> bool {
        if self.last_id().is_some_and(|last| record.id <= last) {
            return false;
        }
        self.next_id = self.next_id.max(record.id + 1);
        self.summaries.push(RecordSummary::from(&record));
        let slots = self.by_source.entry(record.source.clone()).or_default();
        if record.is_success() {
            slots.latest_success = Some(record);
        } else {
            slots.latest_failure = Some(record);
        }
        true
    }

    pub fn latest_success(&self, source: &str) -> Option<&AttemptRecord> {
        self.by_source
            .get(source)
            .and_then(|s| s.latest_success.as_ref())
    }

    pub fn latest_failure(&self, source: &str) -> Option<&AttemptRecord> {
        self.by_source
            .get(source)
            .and_then(|s| s.latest_failure.as_ref())
    }

    pub fn recent(&self, limit: usize) -> Vec<RecordSummary> {
        self.summaries.iter().rev().take(limit).cloned().collect()
    }

    pub fn last_id(&self) -> Option<u64> {
        self.summaries.last().map(|s| s.id)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

// Lock helpers: a poisoned lock still guards structurally valid data (every
// mutation is a single push or slot swap), so recover the guard instead of
// propagating the panic.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}
