//! Skyglass collector binary.
//! Loads config, opens the attempt log, starts one timer per source and
//! serves the query API.

use shuttle_axum::ShuttleAxum;
use skyglass_collector::config::{load_sources_default, AppConfig};
use skyglass_collector::metrics::Metrics;
use skyglass_collector::{init_tracing, AppContext};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env()?;
    let specs = load_sources_default()?;
    let ctx = AppContext::from_config(config, &specs).await?;

    let metrics = if ctx.config.metrics_enabled {
        match Metrics::init(ctx.registry.len()) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!("metrics disabled: {e:#}");
                None
            }
        }
    } else {
        None
    };

    // Source loops are detached; they run for the life of the process.
    let scheduler = ctx.start_scheduler();
    tracing::info!(sources = ?scheduler.sources(), "collection scheduler running");
    ctx.start_backup();

    let mut router = ctx.router();
    if let Some(m) = &metrics {
        router = router.merge(m.router());
    }

    Ok(router.into())
}
