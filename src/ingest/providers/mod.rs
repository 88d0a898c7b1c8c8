// src/ingest/providers/mod.rs
pub mod firms;
pub mod usgs;

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::config::{AppConfig, SourceSpec};
use crate::ingest::scheduler::SourceRegistry;
use crate::ingest::types::Collector;

/// Known source names and the collector that serves each.
pub fn collector_for(source: &str, cfg: &AppConfig) -> Option<Arc<dyn Collector>> {
    match source {
        "earthquakes_usgs" => Some(Arc::new(usgs::UsgsSeismicCollector::new())),
        "wildfires_firms" => Some(Arc::new(firms::FirmsCollector::new(
            cfg.firms_api_key.clone(),
        ))),
        _ => None,
    }
}

/// Registry for every enabled spec. Unknown source names are an error.
pub fn build_registry(specs: &[SourceSpec], cfg: &AppConfig) -> Result<SourceRegistry> {
    let mut registry = SourceRegistry::new();
    for spec in specs.iter().filter(|s| s.enabled) {
        let collector = collector_for(&spec.name, cfg)
            .ok_or_else(|| anyhow!("no collector for source '{}'", spec.name))?;
        registry.register(spec.name.clone(), spec.interval(), collector)?;
    }
    Ok(registry)
}
