use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::record::RecordSummary;
use crate::retrieval::{Latest, RetrievalService};

pub const STATUS_MESSAGE: &str = "Skyglass Backend Service is Active";
pub const NO_DATA_MESSAGE: &str = "No data found. The scheduler may not have run yet.";

const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub retrieval: RetrievalService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/status", get(status))
        .route("/api/latest/{source}", get(latest))
        .route("/api/log", get(recent_log))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({ "message": STATUS_MESSAGE }))
}

async fn latest(State(state): State<AppState>, Path(source): Path<String>) -> Response {
    match state.retrieval.latest(&source).await {
        Ok(Latest::Data(rec)) => Json(rec.payload().cloned().unwrap_or_default()).into_response(),
        Ok(Latest::LastAttemptFailed(rec)) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "Last attempt failed: {}",
                rec.error_message().unwrap_or_default()
            ),
        ),
        Ok(Latest::NoData) => error_body(StatusCode::NOT_FOUND, NO_DATA_MESSAGE.to_string()),
        Err(e) => {
            tracing::error!(target: "api", source = %source, error = %e, "latest query failed");
            error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                "Log store unavailable".to_string(),
            )
        }
    }
}

#[derive(serde::Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

async fn recent_log(
    State(state): State<AppState>,
    Query(q): Query<LogQuery>,
) -> Result<Json<Vec<RecordSummary>>, Response> {
    let limit = q.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    state.retrieval.recent(limit).await.map(Json).map_err(|e| {
        tracing::error!(target: "api", error = %e, "recent log query failed");
        error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "Log store unavailable".to_string(),
        )
    })
}
