//! Record a downloaded file's SHA-256 in the integrity log.

use anyhow::Context;
use clap::Parser;
use serde_json::{json, Value};
use skyglass_collector::config::app::DEFAULT_INTEGRITY_LOG_PATH;
use skyglass_collector::integrity::{IntegrityError, IntegrityLog};
use std::path::PathBuf;

/// Hash a file and append it to the integrity log (once per path).
#[derive(Parser, Debug)]
#[command(name = "integrity_log", version, about)]
struct Cli {
    /// File to hash.
    file: PathBuf,

    /// Where the file came from (e.g. "Sentinel-1").
    source: String,

    /// Extra JSON stored with the entry.
    #[arg(long, value_parser = parse_metadata, default_value = "{}")]
    metadata: Value,

    /// Integrity log file.
    #[arg(long, env = "INTEGRITY_LOG_PATH", default_value = DEFAULT_INTEGRITY_LOG_PATH)]
    log: PathBuf,
}

fn parse_metadata(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("metadata must be valid JSON: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    skyglass_collector::init_tracing();
    let cli = Cli::parse();

    let log = IntegrityLog::open(&cli.log)
        .await
        .with_context(|| format!("opening {}", cli.log.display()))?;

    match log.log_file(&cli.file, &cli.source, cli.metadata).await {
        Ok(e) => println!("logged {} sha256={}", e.file_path, e.sha256),
        Err(IntegrityError::AlreadyLogged(p)) => {
            println!("record for {p} already exists in the log, skipping")
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
