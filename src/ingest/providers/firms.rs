// src/ingest/providers/firms.rs
//! NASA FIRMS active-fire detections (VIIRS S-NPP, last 24h, world) as GeoJSON.

use async_trait::async_trait;
use metrics::histogram;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::error::CollectError;
use crate::ingest::types::{Collector, FetchOutcome};

pub const FIRMS_KEY_ENV: &str = "FIRMS_API_KEY";
const FIRMS_BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov/api/v1/nrt/viirs-snpp-j1/csv";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn collector_error(e: impl std::fmt::Display) -> String {
    format!("FIRMS Collector Error: {e}")
}

pub struct FirmsCollector {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        api_key: Option<String>,
        client: reqwest::Client,
    },
}

impl FirmsCollector {
    /// A blank key counts as missing; `fetch` then fails without any request.
    pub fn new(api_key: Option<String>) -> Self {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self {
            mode: Mode::Http {
                api_key,
                client: reqwest::Client::new(),
            },
        }
    }

    pub fn from_fixture(csv: &str) -> Self {
        Self {
            mode: Mode::Fixture(csv.to_string()),
        }
    }

    fn url_for(key: &str) -> String {
        format!("{FIRMS_BASE_URL}/{key}/world/1")
    }
}

const REQUIRED: [&str; 6] = [
    "latitude",
    "longitude",
    "bright_ti4",
    "confidence",
    "frp",
    "acq_time",
];

/// Numbers stay numbers, everything else is kept as a string.
fn cell_value(raw: &str) -> Value {
    let s = raw.trim();
    if let Ok(i) = s.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_finite() {
            return json!(f);
        }
    }
    Value::String(s.to_string())
}

/// Split CSV text into records. Quoted fields may hold commas, doubled
/// quotes and line breaks. Blank records are dropped.
fn csv_records(text: &str) -> Result<Vec<Vec<String>>, String> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        push_record(&mut records, record);
    }
    Ok(records)
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    if record.iter().any(|f| !f.trim().is_empty()) {
        records.push(record);
    }
}

/// FIRMS CSV -> GeoJSON FeatureCollection of points.
pub fn csv_to_feature_collection(text: &str) -> FetchOutcome {
    let t0 = std::time::Instant::now();
    let rows = csv_records(text).map_err(|e| CollectError::Parse(collector_error(e)))?;
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        return Ok(json!({"type": "FeatureCollection", "features": []}));
    };

    let columns: Vec<&str> = header.iter().map(|c| c.trim()).collect();
    let mut idx = [0usize; REQUIRED.len()];
    for (slot, name) in idx.iter_mut().zip(REQUIRED) {
        *slot = columns
            .iter()
            .position(|c| *c == name)
            .ok_or_else(|| CollectError::Parse(collector_error(format!("missing column '{name}'"))))?;
    }
    let [lat_i, lon_i, bright_i, conf_i, frp_i, time_i] = idx;

    let mut features = Vec::new();
    for (row_no, cells) in rows.enumerate() {
        if cells.len() < columns.len() {
            return Err(CollectError::Parse(collector_error(format!(
                "row {} has {} fields, expected {}",
                row_no + 1,
                cells.len(),
                columns.len()
            ))));
        }
        let coord = |i: usize| -> Result<f64, CollectError> {
            cells[i].trim().parse::<f64>().map_err(|e| {
                CollectError::Parse(collector_error(format!(
                    "row {} {}: {e}",
                    row_no + 1,
                    columns[i]
                )))
            })
        };
        let (lat, lon) = (coord(lat_i)?, coord(lon_i)?);

        let mut props = Map::new();
        props.insert("brightness".into(), cell_value(&cells[bright_i]));
        props.insert("confidence".into(), cell_value(&cells[conf_i]));
        props.insert("frp".into(), cell_value(&cells[frp_i]));
        props.insert("acq_time".into(), cell_value(&cells[time_i]));

        features.push(json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [lon, lat]},
            "properties": Value::Object(props),
        }));
    }

    histogram!("firms_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(json!({"type": "FeatureCollection", "features": features}))
}

#[async_trait]
impl Collector for FirmsCollector {
    async fn fetch(&self) -> FetchOutcome {
        match &self.mode {
            Mode::Fixture(csv) => csv_to_feature_collection(csv),
            Mode::Http { api_key, client } => {
                let Some(key) = api_key else {
                    return Err(CollectError::MissingCredential(format!(
                        "{FIRMS_KEY_ENV} not configured"
                    )));
                };
                let body = client
                    .get(Self::url_for(key))
                    .timeout(REQUEST_TIMEOUT)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| CollectError::Http(collector_error(e.without_url())))?
                    .text()
                    .await
                    .map_err(|e| CollectError::Http(collector_error(e)))?;
                csv_to_feature_collection(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "firms_viirs"
    }
}
