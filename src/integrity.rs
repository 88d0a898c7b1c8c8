// src/integrity.rs
//! File integrity log used by the imagery download workflow.
//!
//! Each entry pins a downloaded file to its SHA-256 digest. Entries live in
//! their own JSONL file, separate from the attempt log, and a file path can
//! be logged only once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::record::hex_lower;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityEntry {
    pub timestamp: DateTime<Utc>,
    pub file_path: String,
    pub sha256: String,
    pub source: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("file path is empty")]
    EmptyPath,

    #[error("record for {0} already exists in the log")]
    AlreadyLogged(String),

    #[error("integrity log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("integrity log serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Hex SHA-256 of a file, read in 4 KiB blocks.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_lower(&hasher.finalize()))
}

struct Inner {
    file: File,
    entries: Vec<IntegrityEntry>,
}

pub struct IntegrityLog {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl IntegrityLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IntegrityError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        let mut entries = Vec::new();
        match fs::read_to_string(&path).await {
            Ok(text) => {
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    match serde_json::from_str::<IntegrityEntry>(line) {
                        Ok(e) => entries.push(e),
                        Err(e) => tracing::warn!(
                            target: "integrity",
                            path = %path.display(),
                            error = %e,
                            "undecodable integrity line, skipped"
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            inner: Mutex::new(Inner { file, entries }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash `file_path` and record it under `source`.
    pub async fn log_file(
        &self,
        file_path: &Path,
        source: &str,
        metadata: Value,
    ) -> Result<IntegrityEntry, IntegrityError> {
        let key = file_path.to_string_lossy().to_string();
        if key.trim().is_empty() {
            return Err(IntegrityError::EmptyPath);
        }

        let mut inner = self.inner.lock().await;
        if inner.entries.iter().any(|e| e.file_path == key) {
            tracing::info!(target: "integrity", file = %key, "already logged, skipping");
            return Err(IntegrityError::AlreadyLogged(key));
        }

        let sha256 = sha256_file(file_path).await?;
        let entry = IntegrityEntry {
            timestamp: Utc::now(),
            file_path: key,
            sha256,
            source: source.to_string(),
            metadata,
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        inner.file.write_all(&line).await?;
        inner.file.flush().await?;
        inner.file.sync_data().await?;
        inner.entries.push(entry.clone());

        tracing::info!(
            target: "integrity",
            file = %entry.file_path,
            source = %entry.source,
            hash = &entry.sha256[..10],
            "logged file"
        );
        Ok(entry)
    }

    pub async fn entries(&self) -> Vec<IntegrityEntry> {
        self.inner.lock().await.entries.clone()
    }
}
