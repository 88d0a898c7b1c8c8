// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod ingest;
pub mod integrity;
pub mod metrics;
pub mod record;
pub mod retrieval;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::app::AppContext;
pub use crate::error::{CollectError, SchedulerError, StoreError};
pub use crate::ingest::scheduler::{Scheduler, SchedulerCfg, SchedulerHandle, SourceRegistry};
pub use crate::ingest::types::{Collector, FetchOutcome};
pub use crate::record::{AttemptRecord, AttemptStatus, NewAttempt, RecordSummary};
pub use crate::retrieval::{Latest, RetrievalService};
pub use crate::store::{JsonlLogStore, LogStore, MemoryLogStore};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to JSON lines.
/// No-op if a subscriber is already installed (e.g. by the hosting runtime).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("skyglass_collector=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
