// src/ingest/backup.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

#[async_trait::async_trait]
pub trait BackupSink: Send + Sync {
    /// Store one snapshot `(file name, content)` taken at `now`; returns where it went.
    async fn store(&self, name: &str, content: Vec<u8>, now: DateTime<Utc>) -> Result<PathBuf>;
}

/// Writes snapshots to `<root>/skyglass_backup_<YYYYmmdd_HHMM>/<name>`.
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl BackupSink for DirectorySink {
    async fn store(&self, name: &str, content: Vec<u8>, now: DateTime<Utc>) -> Result<PathBuf> {
        let dir = self
            .root
            .join(format!("skyglass_backup_{}", now.format("%Y%m%d_%H%M")));
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        let target = dir.join(name);
        tokio::fs::write(&target, content)
            .await
            .with_context(|| format!("writing {}", target.display()))?;
        Ok(target)
    }
}

/// Snapshot the attempt log file into `sink`. `Ok(None)` if there is no log yet.
/// A snapshot taken during an append may end in a partial line; the store
/// skips such a line when it is opened.
pub async fn backup_log_once<S: BackupSink + ?Sized>(
    log_path: &Path,
    sink: &S,
    now: DateTime<Utc>,
) -> Result<Option<PathBuf>> {
    let content = match tokio::fs::read(log_path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(
                target: "backup",
                path = %log_path.display(),
                "attempt log not found, skipping backup"
            );
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("reading {}", log_path.display())),
    };
    let name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "attempt_log.jsonl".to_string());
    let target = sink.store(&name, content, now).await?;
    tracing::info!(target: "backup", to = %target.display(), "attempt log backed up");
    Ok(Some(target))
}

/// Daily backup task. Wire this from app startup.
pub fn spawn_daily_backup_task<S: BackupSink + 'static>(
    log_path: PathBuf,
    sink: S,
) -> tokio::task::JoinHandle<()> {
    let period = std::time::Duration::from_secs(24 * 3600);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = backup_log_once(&log_path, &sink, Utc::now()).await {
                tracing::warn!(target: "backup", "backup failed: {e:#}");
            }
        }
    })
}
