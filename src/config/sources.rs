// src/config/sources.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SOURCES_PATH: &str = "SOURCES_CONFIG_PATH";

fn default_enabled() -> bool {
    true
}

/// One scheduled source as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub interval_minutes: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SourceSpec {
    pub fn new(name: &str, interval_minutes: u64) -> Self {
        Self {
            name: name.to_string(),
            interval_minutes,
            enabled: true,
        }
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_minutes * 60)
    }
}

/// USGS every 5 minutes, FIRMS every 20.
pub fn default_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::new("earthquakes_usgs", 5),
        SourceSpec::new("wildfires_firms", 20),
    ]
}

/// Load sources from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing sources from {}", path.display()))
}

/// Load sources using env var + fallbacks:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) built-in defaults
pub fn load_sources_default() -> Result<Vec<SourceSpec>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        bail!("{ENV_SOURCES_PATH} points to non-existent path");
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(default_sources())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceSpec>> {
    let parsed = match hint_ext {
        "toml" => parse_toml(s)?,
        "json" => parse_json(s)?,
        _ => parse_toml(s)
            .or_else(|_| parse_json(s))
            .map_err(|_| anyhow!("unsupported sources format"))?,
    };
    clean_list(parsed)
}

fn parse_toml(s: &str) -> Result<Vec<SourceSpec>> {
    #[derive(Deserialize)]
    struct TomlSources {
        sources: Vec<SourceSpec>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(v.sources)
}

fn parse_json(s: &str) -> Result<Vec<SourceSpec>> {
    Ok(serde_json::from_str(s)?)
}

fn clean_list(items: Vec<SourceSpec>) -> Result<Vec<SourceSpec>> {
    let mut out: Vec<SourceSpec> = Vec::with_capacity(items.len());
    for mut it in items {
        it.name = it.name.trim().to_string();
        if it.name.is_empty() {
            continue;
        }
        if it.interval_minutes == 0 {
            bail!("source '{}' has interval_minutes = 0", it.name);
        }
        if out.iter().any(|o| o.name == it.name) {
            bail!("source '{}' is listed twice", it.name);
        }
        out.push(it);
    }
    Ok(out)
}
