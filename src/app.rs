// src/app.rs
//! Process-scoped context: the one store and registry every job and query uses.

use anyhow::{Context, Result};
use shuttle_axum::axum::Router;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::api::{self, AppState};
use crate::config::{AppConfig, SourceSpec};
use crate::ingest::backup::{spawn_daily_backup_task, DirectorySink};
use crate::ingest::providers::build_registry;
use crate::ingest::scheduler::{Scheduler, SchedulerHandle, SourceRegistry};
use crate::retrieval::RetrievalService;
use crate::store::{JsonlLogStore, LogStore, MemoryLogStore};

pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<dyn LogStore>,
    pub registry: SourceRegistry,
}

impl AppContext {
    /// Open the configured store and build the registry for `specs`.
    pub async fn from_config(config: AppConfig, specs: &[SourceSpec]) -> Result<Self> {
        let store: Arc<dyn LogStore> = match &config.log_store_path {
            Some(path) => Arc::new(
                JsonlLogStore::open(path)
                    .await
                    .with_context(|| format!("opening attempt log {}", path.display()))?,
            ),
            None => {
                tracing::warn!("LOG_STORE_PATH is empty, attempts are kept in memory only");
                Arc::new(MemoryLogStore::new())
            }
        };
        let registry = build_registry(specs, &config)?;
        Ok(Self::with_parts(config, store, registry))
    }

    pub fn with_parts(config: AppConfig, store: Arc<dyn LogStore>, registry: SourceRegistry) -> Self {
        Self {
            config,
            store,
            registry,
        }
    }

    pub fn retrieval(&self) -> RetrievalService {
        RetrievalService::new(self.store.clone())
    }

    pub fn router(&self) -> Router {
        api::router(AppState {
            retrieval: self.retrieval(),
        })
    }

    pub fn start_scheduler(&self) -> SchedulerHandle {
        Scheduler::with_registry(
            self.registry.clone(),
            self.store.clone(),
            self.config.scheduler_cfg(),
        )
        .start()
    }

    /// Daily log backup, when both a backup dir and a log file are configured.
    pub fn start_backup(&self) -> Option<JoinHandle<()>> {
        let dir = self.config.backup_dir.as_ref()?;
        let log = self.config.log_store_path.as_ref()?;
        Some(spawn_daily_backup_task(
            log.clone(),
            DirectorySink::new(dir.clone()),
        ))
    }
}
