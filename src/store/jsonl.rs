// src/store/jsonl.rs
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::{read_lock, write_lock, LogStore, RecordIndex};
use crate::error::StoreError;
use crate::record::{AttemptRecord, NewAttempt, RecordSummary};

struct Writer {
    file: File,
    // Last write may have left a partial line behind.
    torn: bool,
}

/// Non-blank lines of the log file, streamed one at a time.
struct LineReader {
    reader: BufReader<File>,
    buf: Vec<u8>,
    lineno: usize,
    // The last chunk read had no trailing newline.
    torn: bool,
}

impl LineReader {
    /// `Ok(None)` if the file does not exist.
    async fn open(path: &Path) -> Result<Option<Self>, StoreError> {
        match File::open(path).await {
            Ok(file) => Ok(Some(Self {
                reader: BufReader::new(file),
                buf: Vec::with_capacity(4096),
                lineno: 0,
                torn: false,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Next non-blank line as `(line number, bytes)`.
    async fn next_line(&mut self) -> Result<Option<(usize, &[u8])>, StoreError> {
        loop {
            self.buf.clear();
            let n = self.reader.read_until(b'\n', &mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.lineno += 1;
            self.torn = !self.buf.ends_with(b"\n");
            if !self.buf.iter().all(u8::is_ascii_whitespace) {
                return Ok(Some((self.lineno, &self.buf)));
            }
        }
    }
}

/// Durable attempt log: one JSON record per line, fsync'd on every append.
/// Only summaries and the latest record per source and kind stay in memory.
pub struct JsonlLogStore {
    path: PathBuf,
    writer: Mutex<Writer>,
    index: RwLock<RecordIndex>,
}

impl JsonlLogStore {
    /// Open (or create) the log at `path` and replay existing records.
    /// Lines that do not decode are skipped with a warning.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        let mut index = RecordIndex::default();
        let mut torn = false;
        if let Some(mut lines) = LineReader::open(&path).await? {
            let mut skipped = 0usize;
            while let Some((lineno, line)) = lines.next_line().await? {
                match serde_json::from_slice::<AttemptRecord>(line) {
                    Ok(rec) => {
                        if !index.insert(rec) {
                            skipped += 1;
                            tracing::warn!(
                                target: "store",
                                path = %path.display(),
                                line = lineno,
                                "out-of-order record id, skipped"
                            );
                        }
                    }
                    Err(e) => {
                        skipped += 1;
                        tracing::warn!(
                            target: "store",
                            path = %path.display(),
                            line = lineno,
                            error = %e,
                            "undecodable log line, skipped"
                        );
                    }
                }
            }
            torn = lines.torn;
            tracing::info!(
                target: "store",
                path = %path.display(),
                records = index.len(),
                skipped,
                "attempt log replayed"
            );
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            writer: Mutex::new(Writer { file, torn }),
            index: RwLock::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_line(w: &mut Writer, record: &AttemptRecord) -> Result<(), StoreError> {
        let mut buf = Vec::with_capacity(256);
        if w.torn {
            buf.push(b'\n');
        }
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');

        let start = w.file.metadata().await?.len();
        if let Err(e) = Self::commit(&mut w.file, &buf).await {
            Self::rollback(w, start).await;
            return Err(e.into());
        }
        w.torn = false;
        Ok(())
    }

    async fn commit(file: &mut File, buf: &[u8]) -> std::io::Result<()> {
        file.write_all(buf).await?;
        file.flush().await?;
        file.sync_data().await
    }

    /// Cut the file back to `len` so a failed append leaves no record behind,
    /// not even one that would reappear on the next replay.
    async fn rollback(w: &mut Writer, len: u64) {
        match w.file.set_len(len).await {
            // Back to the state before the append, torn flag included.
            Ok(()) => {}
            Err(e) => {
                w.torn = true;
                tracing::error!(
                    target: "store",
                    error = %e,
                    "could not truncate after failed append, next append starts a fresh line"
                );
            }
        }
    }
}

#[async_trait]
impl LogStore for JsonlLogStore {
    async fn append(&self, entry: NewAttempt) -> Result<AttemptRecord, StoreError> {
        let mut w = self.writer.lock().await;
        // Ids are burned even if the write fails, so a torn line can never
        // share an id with a later record.
        let record = write_lock(&self.index).allocate(entry, Utc::now());
        Self::write_line(&mut w, &record).await?;
        write_lock(&self.index).insert(record.clone());
        Ok(record)
    }

    async fn latest_success(&self, source: &str) -> Result<Option<AttemptRecord>, StoreError> {
        Ok(read_lock(&self.index).latest_success(source).cloned())
    }

    async fn latest_failure(&self, source: &str) -> Result<Option<AttemptRecord>, StoreError> {
        Ok(read_lock(&self.index).latest_failure(source).cloned())
    }

    /// Streams the file, applying the same acceptance rules as replay.
    /// Lines appended after the call started are not included.
    async fn records(&self, source: &str) -> Result<Vec<AttemptRecord>, StoreError> {
        let Some(last) = read_lock(&self.index).last_id() else {
            return Ok(Vec::new());
        };
        let Some(mut lines) = LineReader::open(&self.path).await? else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        let mut prev = 0u64;
        while let Some((_, line)) = lines.next_line().await? {
            let Ok(rec) = serde_json::from_slice::<AttemptRecord>(line) else {
                continue;
            };
            if rec.id <= prev {
                continue;
            }
            if rec.id > last {
                break;
            }
            prev = rec.id;
            if rec.source == source {
                out.push(rec);
            }
        }
        Ok(out)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RecordSummary>, StoreError> {
        Ok(read_lock(&self.index).recent(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AttemptStatus;
    use serde_json::json;

    fn ok(source: &str, v: serde_json::Value) -> NewAttempt {
        NewAttempt {
            source: source.into(),
            status: AttemptStatus::success(v),
        }
    }

    fn fail(source: &str, msg: &str) -> NewAttempt {
        NewAttempt {
            source: source.into(),
            status: AttemptStatus::failure(msg),
        }
    }

    #[tokio::test]
    async fn reopen_replays_records_and_continues_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/attempts.jsonl");

        {
            let store = JsonlLogStore::open(&path).await.unwrap();
            store.append(ok("quake", json!({"count": 3}))).await.unwrap();
            store.append(fail("quake", "timeout")).await.unwrap();
        }

        let store = JsonlLogStore::open(&path).await.unwrap();
        let s = store.latest_success("quake").await.unwrap().unwrap();
        assert_eq!(s.id, 1);
        assert_eq!(s.payload(), Some(&json!({"count": 3})));
        let f = store.latest_failure("quake").await.unwrap().unwrap();
        assert_eq!(f.error_message(), Some("timeout"));

        let next = store.append(fail("quake", "dns error")).await.unwrap();
        assert_eq!(next.id, 3);
    }

    #[tokio::test]
    async fn torn_last_line_is_skipped_and_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.jsonl");

        {
            let store = JsonlLogStore::open(&path).await.unwrap();
            store.append(ok("quake", json!({"count": 1}))).await.unwrap();
        }
        // Simulate a crash mid-write.
        let mut raw = std::fs::read(&path).unwrap();
        raw.extend_from_slice(br#"{"id":2,"source":"quake","timest"#);
        std::fs::write(&path, raw).unwrap();

        let store = JsonlLogStore::open(&path).await.unwrap();
        assert_eq!(store.records("quake").await.unwrap().len(), 1);
        store.append(ok("quake", json!({"count": 2}))).await.unwrap();
        drop(store);

        let store = JsonlLogStore::open(&path).await.unwrap();
        let recs = store.records("quake").await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].payload(), Some(&json!({"count": 2})));
    }

    #[tokio::test]
    async fn every_line_is_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.jsonl");
        let store = JsonlLogStore::open(&path).await.unwrap();
        store.append(ok("a", json!({"x": 1}))).await.unwrap();
        store.append(fail("b", "nope")).await.unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["success"], json!(true));
        assert_eq!(first["content_hash"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn records_are_read_back_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.jsonl");
        let store = JsonlLogStore::open(&path).await.unwrap();
        for n in 0..3 {
            store.append(ok("quake", json!({ "n": n }))).await.unwrap();
            store.append(fail("fire", "nope")).await.unwrap();
        }

        let quakes = store.records("quake").await.unwrap();
        assert_eq!(
            quakes.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
        assert_eq!(quakes[2].payload(), Some(&json!({"n": 2})));
        assert!(store.records("none-source").await.unwrap().is_empty());

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent[0].id, 6);
        assert_eq!(recent[1].content_hash.as_deref(), quakes[2].content_hash());
    }

    #[tokio::test]
    async fn rollback_leaves_no_record_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.jsonl");
        let store = JsonlLogStore::open(&path).await.unwrap();
        store.append(ok("quake", json!({"count": 1}))).await.unwrap();

        {
            // A complete line whose sync was never confirmed.
            let mut w = store.writer.lock().await;
            let start = w.file.metadata().await.unwrap().len();
            let orphan = AttemptRecord {
                id: 2,
                source: "quake".into(),
                timestamp: Utc::now(),
                status: AttemptStatus::success(json!({"count": 2})),
            };
            let mut line = serde_json::to_vec(&orphan).unwrap();
            line.push(b'\n');
            w.file.write_all(&line).await.unwrap();
            w.file.flush().await.unwrap();
            JsonlLogStore::rollback(&mut w, start).await;
            assert!(!w.torn);
        }
        drop(store);

        let store = JsonlLogStore::open(&path).await.unwrap();
        let recs = store.records("quake").await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(store.latest_success("quake").await.unwrap().unwrap().id, 1);
    }
}
