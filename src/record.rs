// src/record.rs
//! Attempt records: one immutable entry per collection attempt, plus the
//! canonical JSON form used for content hashing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Outcome part of a record. A success always carries payload + hash,
/// a failure always carries a message; nothing else is representable.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptStatus {
    Success { payload: Value, content_hash: String },
    Failure { error_message: String },
}

impl AttemptStatus {
    /// Build a success, hashing the canonical form of `payload`.
    pub fn success(payload: Value) -> Self {
        let content_hash = content_hash(&payload);
        AttemptStatus::Success {
            payload,
            content_hash,
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        AttemptStatus::Failure {
            error_message: error_message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptStatus::Success { .. })
    }
}

/// A record that has not been appended yet (no id, no timestamp).
#[derive(Debug, Clone, PartialEq)]
pub struct NewAttempt {
    pub source: String,
    pub status: AttemptStatus,
}

/// One logged attempt. `id` and `timestamp` are assigned by the store on append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordRow", into = "RecordRow")]
pub struct AttemptRecord {
    pub id: u64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub status: AttemptStatus,
}

impl AttemptRecord {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.status {
            AttemptStatus::Success { payload, .. } => Some(payload),
            AttemptStatus::Failure { .. } => None,
        }
    }

    pub fn content_hash(&self) -> Option<&str> {
        match &self.status {
            AttemptStatus::Success { content_hash, .. } => Some(content_hash),
            AttemptStatus::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            AttemptStatus::Success { .. } => None,
            AttemptStatus::Failure { error_message } => Some(error_message),
        }
    }
}

/// Payload-free view of a record, as listed by the log viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: u64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&AttemptRecord> for RecordSummary {
    fn from(r: &AttemptRecord) -> Self {
        RecordSummary {
            id: r.id,
            source: r.source.clone(),
            timestamp: r.timestamp,
            success: r.is_success(),
            content_hash: r.content_hash().map(str::to_string),
            error_message: r.error_message().map(str::to_string),
        }
    }
}

// Flat on-disk / on-wire shape.
#[derive(Serialize, Deserialize)]
struct RecordRow {
    id: u64,
    source: String,
    timestamp: DateTime<Utc>,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_hash: Option<String>,
}

impl From<AttemptRecord> for RecordRow {
    fn from(r: AttemptRecord) -> Self {
        let (success, payload, error_message, content_hash) = match r.status {
            AttemptStatus::Success {
                payload,
                content_hash,
            } => (true, Some(payload), None, Some(content_hash)),
            AttemptStatus::Failure { error_message } => (false, None, Some(error_message), None),
        };
        RecordRow {
            id: r.id,
            source: r.source,
            timestamp: r.timestamp,
            success,
            payload,
            error_message,
            content_hash,
        }
    }
}

impl TryFrom<RecordRow> for AttemptRecord {
    type Error = String;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = if row.success {
            if row.error_message.is_some() {
                return Err(format!("record {}: success with error_message", row.id));
            }
            let content_hash = row
                .content_hash
                .ok_or_else(|| format!("record {}: success without content_hash", row.id))?;
            AttemptStatus::Success {
                // A `null` payload deserializes as None.
                payload: row.payload.unwrap_or(Value::Null),
                content_hash,
            }
        } else {
            if row.payload.is_some() || row.content_hash.is_some() {
                return Err(format!("record {}: failure with payload or hash", row.id));
            }
            let error_message = row
                .error_message
                .ok_or_else(|| format!("record {}: failure without error_message", row.id))?;
            AttemptStatus::Failure { error_message }
        };
        Ok(AttemptRecord {
            id: row.id,
            source: row.source,
            timestamp: row.timestamp,
            status,
        })
    }
}

/// Serialize `value` with object keys sorted at every depth and no whitespace.
/// Independent of map insertion order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 of the canonical JSON form.
pub fn content_hash(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_lower(&digest)
}

pub(crate) fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
