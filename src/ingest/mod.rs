// src/ingest/mod.rs
pub mod backup;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::error::{CollectError, StoreError};
use crate::ingest::types::FetchOutcome;
use crate::record::{AttemptRecord, AttemptStatus, NewAttempt};
use crate::store::LogStore;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde_json::Value;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_attempts_total",
            "Attempt records appended, by source and result."
        );
        describe_counter!(
            "ingest_store_errors_total",
            "Appends that failed at the storage layer."
        );
        describe_counter!(
            "scheduler_ticks_skipped_total",
            "Ticks dropped because the previous job for the source was still running."
        );
        describe_histogram!("collector_fetch_ms", "Collector fetch time in milliseconds.");
        describe_gauge!(
            "ingest_last_attempt_ts",
            "Unix ts of the last appended attempt per source."
        );
    });
}

/// A payload that is an object with an `error` key is an error outcome.
fn reported_error(payload: &Value) -> Option<String> {
    let err = payload.as_object()?.get("error")?;
    Some(match err {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Fold error-shaped payloads into the error side.
pub fn normalize_outcome(outcome: FetchOutcome) -> FetchOutcome {
    match outcome {
        Ok(payload) => match reported_error(&payload) {
            Some(msg) => Err(CollectError::Reported(msg)),
            None => Ok(payload),
        },
        Err(e) => Err(e),
    }
}

/// Turn a fetch outcome into the status of exactly one record.
pub fn classify_outcome(outcome: FetchOutcome) -> AttemptStatus {
    match normalize_outcome(outcome) {
        Ok(payload) => AttemptStatus::success(payload),
        Err(e) => AttemptStatus::failure(e.to_string()),
    }
}

/// Ingestion pipeline: classify, hash, append. One outcome, one record.
/// Identical consecutive payloads are all logged. Only a storage error escapes.
pub async fn ingest(
    store: &dyn LogStore,
    source: &str,
    outcome: FetchOutcome,
) -> Result<AttemptRecord, StoreError> {
    ensure_metrics_described();

    let status = classify_outcome(outcome);
    let result = if status.is_success() {
        "success"
    } else {
        "failure"
    };

    let record = match store
        .append(NewAttempt {
            source: source.to_string(),
            status,
        })
        .await
    {
        Ok(r) => r,
        Err(e) => {
            counter!("ingest_store_errors_total", "source" => source.to_string()).increment(1);
            return Err(e);
        }
    };

    // Telemetry
    counter!(
        "ingest_attempts_total",
        "source" => source.to_string(),
        "result" => result
    )
    .increment(1);
    gauge!("ingest_last_attempt_ts", "source" => source.to_string())
        .set(record.timestamp.timestamp() as f64);

    match &record.status {
        AttemptStatus::Success { content_hash, .. } => tracing::info!(
            target: "ingest",
            source,
            id = record.id,
            hash = content_hash.get(..10).unwrap_or(content_hash),
            "logged success"
        ),
        AttemptStatus::Failure { error_message } => tracing::warn!(
            target: "ingest",
            source,
            id = record.id,
            error = %error_message,
            "logged failure"
        ),
    }

    Ok(record)
}
