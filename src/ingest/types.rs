// src/ingest/types.rs
use serde_json::Value;

use crate::error::CollectError;

/// What one collector invocation produced.
pub type FetchOutcome = Result<Value, CollectError>;

/// A named fetch capability for one source. Implementations must not touch
/// the log store; they only produce an outcome.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    async fn fetch(&self) -> FetchOutcome;
    fn name(&self) -> &'static str;
}
