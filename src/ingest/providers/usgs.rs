// src/ingest/providers/usgs.rs
use async_trait::async_trait;
use std::time::Duration;

use crate::error::CollectError;
use crate::ingest::types::{Collector, FetchOutcome};

/// M2.5+ earthquakes of the past day, GeoJSON.
pub const USGS_FEED_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/2.5_day.geojson";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

fn collector_error(e: impl std::fmt::Display) -> String {
    format!("USGS Seismic Collector Error: {e}")
}

pub struct UsgsSeismicCollector {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl UsgsSeismicCollector {
    pub fn new() -> Self {
        Self::with_url(USGS_FEED_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
            },
        }
    }

    /// Serve a fixed body instead of calling the feed.
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    fn parse_body(body: &str) -> FetchOutcome {
        serde_json::from_str(body).map_err(|e| CollectError::Parse(collector_error(e)))
    }
}

impl Default for UsgsSeismicCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for UsgsSeismicCollector {
    async fn fetch(&self) -> FetchOutcome {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url.as_str())
                    .timeout(REQUEST_TIMEOUT)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| CollectError::Http(collector_error(e)))?;
                let body = resp
                    .text()
                    .await
                    .map_err(|e| CollectError::Http(collector_error(e)))?;
                Self::parse_body(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "usgs_seismic"
    }
}
