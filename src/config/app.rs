// src/config/app.rs
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::ingest::scheduler::SchedulerCfg;

pub const DEFAULT_LOG_STORE_PATH: &str = "data/attempt_log.jsonl";
/// Used by the `integrity_log` bin, which reads `INTEGRITY_LOG_PATH` itself.
pub const DEFAULT_INTEGRITY_LOG_PATH: &str = "data/integrity_log.jsonl";

fn default_fetch_timeout_secs() -> u64 {
    60
}

/// Process settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// `None` keeps the attempt log in memory.
    pub log_store_path: Option<PathBuf>,
    pub fetch_timeout: Duration,
    pub run_on_start: bool,
    pub firms_api_key: Option<String>,
    pub backup_dir: Option<PathBuf>,
    pub metrics_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_store_path: Some(PathBuf::from(DEFAULT_LOG_STORE_PATH)),
            fetch_timeout: Duration::from_secs(default_fetch_timeout_secs()),
            run_on_start: true,
            firms_api_key: None,
            backup_dir: None,
            metrics_enabled: true,
        }
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{name}: expected a boolean, got '{other}'"),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(p) = get("LOG_STORE_PATH") {
            let p = p.trim();
            cfg.log_store_path = (!p.is_empty()).then(|| PathBuf::from(p));
        }
        if let Some(raw) = get("FETCH_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("FETCH_TIMEOUT_SECS: invalid value '{raw}'"))?;
            // Zero would fail every fetch immediately.
            cfg.fetch_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(raw) = get("RUN_ON_START") {
            cfg.run_on_start = parse_flag("RUN_ON_START", &raw)?;
        }
        if let Some(raw) = get("METRICS_ENABLED") {
            cfg.metrics_enabled = parse_flag("METRICS_ENABLED", &raw)?;
        }
        cfg.firms_api_key = get(crate::ingest::providers::firms::FIRMS_KEY_ENV)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        cfg.backup_dir = get("BACKUP_DIR")
            .filter(|p| !p.trim().is_empty())
            .map(|p| PathBuf::from(p.trim()));

        Ok(cfg)
    }

    pub fn scheduler_cfg(&self) -> SchedulerCfg {
        SchedulerCfg {
            fetch_timeout: self.fetch_timeout,
            run_on_start: self.run_on_start,
        }
    }
}
