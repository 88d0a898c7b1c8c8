// src/error.rs
//! Error taxonomy shared by collectors, the log store and the scheduler.

use std::time::Duration;
use thiserror::Error;

/// Everything a collector can report instead of a payload.
/// All variants end up as failure records; none of them escape a scheduled job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    /// A credential or key the collector needs is not configured.
    #[error("{0}")]
    MissingCredential(String),

    #[error("{0}")]
    Http(String),

    #[error("{0}")]
    Parse(String),

    #[error("fetch timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Unhandled exception: {0}")]
    Panicked(String),

    /// The collector returned a payload that itself carries an `error` field.
    #[error("{0}")]
    Reported(String),
}

impl CollectError {
    /// True for the configuration class (missing keys), as opposed to fetch failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, CollectError::MissingCredential(_))
    }
}

/// I/O-level failure of the log store. The only error that aborts an ingestion.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("log store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("log store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("source '{0}' is already registered")]
    DuplicateSource(String),

    #[error("source '{0}' has a zero interval")]
    ZeroInterval(String),
}
