//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use lombada_common::db::records;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    /// Whether a trivial query against the records table succeeded
    pub store_ok: bool,
    pub record_count: Option<i64>,
}

/// GET /health
///
/// Always answers `ok` while the process runs; store reachability is
/// reported separately.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let record_count = match records::ping(&state.db).await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Record store connectivity check failed");
            None
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "lombada-review".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_ok: record_count.is_some(),
        record_count,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
