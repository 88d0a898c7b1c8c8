// src/ingest/scheduler.rs
//! Per-source fixed-interval jobs.
//!
//! Each registered source gets its own tick loop. A tick spawns one
//! fetch-and-ingest job unless the previous job for that source is still
//! running, in which case the tick is dropped. Sources never wait on each other.

use crate::error::{CollectError, SchedulerError};
use crate::ingest::types::{Collector, FetchOutcome};
use crate::record::AttemptRecord;
use crate::store::LogStore;
use metrics::{counter, histogram};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    /// Upper bound on one collector invocation.
    pub fetch_timeout: Duration,
    /// Fire the first tick at `start()` instead of one interval later.
    pub run_on_start: bool,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(60),
            run_on_start: true,
        }
    }
}

#[derive(Clone)]
pub struct RegisteredSource {
    pub interval: Duration,
    pub collector: Arc<dyn Collector>,
}

/// Static `source name -> (collector, interval)` table, filled at startup.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    entries: BTreeMap<String, RegisteredSource>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        source: impl Into<String>,
        interval: Duration,
        collector: Arc<dyn Collector>,
    ) -> Result<(), SchedulerError> {
        let source = source.into();
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval(source));
        }
        if self.entries.contains_key(&source) {
            return Err(SchedulerError::DuplicateSource(source));
        }
        self.entries.insert(
            source,
            RegisteredSource {
                interval,
                collector,
            },
        );
        Ok(())
    }

    pub fn get(&self, source: &str) -> Option<&RegisteredSource> {
        self.entries.get(source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisteredSource)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct Scheduler {
    registry: SourceRegistry,
    store: Arc<dyn LogStore>,
    cfg: SchedulerCfg,
}

impl Scheduler {
    pub fn new(store: Arc<dyn LogStore>, cfg: SchedulerCfg) -> Self {
        Self::with_registry(SourceRegistry::new(), store, cfg)
    }

    pub fn with_registry(
        registry: SourceRegistry,
        store: Arc<dyn LogStore>,
        cfg: SchedulerCfg,
    ) -> Self {
        Self {
            registry,
            store,
            cfg,
        }
    }

    pub fn register(
        &mut self,
        source: impl Into<String>,
        interval: Duration,
        collector: Arc<dyn Collector>,
    ) -> Result<(), SchedulerError> {
        self.registry.register(source, interval, collector)
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Spawn one tick loop per registered source. Must be called inside a
    /// tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        crate::ingest::ensure_metrics_described();
        let mut loops = Vec::with_capacity(self.registry.len());
        for (source, entry) in self.registry.entries {
            tracing::info!(
                target: "scheduler",
                source = %source,
                collector = entry.collector.name(),
                interval_secs = entry.interval.as_secs_f64(),
                "scheduling source"
            );
            let handle = tokio::spawn(source_loop(
                source.clone(),
                entry,
                self.store.clone(),
                self.cfg,
            ));
            loops.push((source, handle));
        }
        tracing::info!(target: "scheduler", sources = loops.len(), "scheduler started");
        SchedulerHandle { loops }
    }
}

/// Running tick loops. Dropping the handle leaves them running.
pub struct SchedulerHandle {
    loops: Vec<(String, JoinHandle<()>)>,
}

impl SchedulerHandle {
    pub fn sources(&self) -> Vec<&str> {
        self.loops.iter().map(|(s, _)| s.as_str()).collect()
    }

    /// True while every source loop is alive.
    pub fn all_running(&self) -> bool {
        self.loops.iter().all(|(_, h)| !h.is_finished())
    }

    /// Stop ticking. In-flight jobs are not drained.
    pub fn shutdown(self) {
        for (_, h) in &self.loops {
            h.abort();
        }
    }
}

// Clears the in-flight flag when the job ends, including by panic.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn source_loop(
    source: String,
    entry: RegisteredSource,
    store: Arc<dyn LogStore>,
    cfg: SchedulerCfg,
) {
    let first = if cfg.run_on_start {
        Instant::now()
    } else {
        Instant::now() + entry.interval
    };
    let mut ticker = tokio::time::interval_at(first, entry.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let busy = Arc::new(AtomicBool::new(false));

    loop {
        ticker.tick().await;

        if busy.swap(true, Ordering::AcqRel) {
            counter!("scheduler_ticks_skipped_total", "source" => source.clone()).increment(1);
            tracing::debug!(
                target: "scheduler",
                source = %source,
                "previous job still running, tick skipped"
            );
            continue;
        }

        let guard = InFlight(busy.clone());
        let source = source.clone();
        let collector = entry.collector.clone();
        let store = store.clone();
        let timeout = cfg.fetch_timeout;
        tokio::spawn(async move {
            let _guard = guard;
            run_job(&source, collector, store.as_ref(), timeout).await;
        });
    }
}

/// One fetch-and-ingest job. Collector failures become failure records;
/// a storage error is logged and the tick's record is lost.
pub async fn run_job(
    source: &str,
    collector: Arc<dyn Collector>,
    store: &dyn LogStore,
    fetch_timeout: Duration,
) -> Option<AttemptRecord> {
    tracing::debug!(target: "scheduler", source, collector = collector.name(), "fetching");
    let outcome = invoke_collector(collector, fetch_timeout).await;
    match crate::ingest::ingest(store, source, outcome).await {
        Ok(rec) => Some(rec),
        Err(e) => {
            tracing::error!(
                target: "scheduler",
                source,
                error = %e,
                "append failed, attempt not recorded"
            );
            None
        }
    }
}

/// Run `collector.fetch()` in its own task under `limit`.
/// Timeouts abort the task; panics are reported as errors.
pub async fn invoke_collector(collector: Arc<dyn Collector>, limit: Duration) -> FetchOutcome {
    let t0 = std::time::Instant::now();
    let name = collector.name();
    let mut task = tokio::spawn(async move { collector.fetch().await });

    let outcome = match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join)) => Err(CollectError::Panicked(join_error_message(join))),
        Err(_) => {
            task.abort();
            Err(CollectError::Timeout(limit))
        }
    };

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("collector_fetch_ms", "collector" => name).record(ms);
    outcome
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "collector panicked".to_string()
    }
}
