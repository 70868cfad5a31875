//! Record listing, search and inspection
//!
//! `GET /api/records?q=&page=` pages through records newest first, filtered
//! by a free-text term matched against the timestamp text, the speed and the
//! plate. `GET /api/records/:id` returns one record.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lombada_common::db::records;
use lombada_common::record::{ConfidenceBand, SpeedBand};
use lombada_common::{Record, RecordFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::pagination::{calculate_pagination, PAGE_SIZE};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    /// Free-text search term; empty lists everything
    #[serde(default)]
    pub q: String,

    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

/// A record plus the display bands the dashboard colours it by
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    #[serde(flatten)]
    pub record: Record,
    pub speed_band: SpeedBand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_band: Option<ConfidenceBand>,
}

impl From<Record> for RecordView {
    fn from(record: Record) -> Self {
        Self {
            speed_band: record.speed_band(),
            confidence_band: record.confidence_band(),
            record,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub query: String,
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub records: Vec<RecordView>,
}

/// GET /api/records?q=TERM&page=N
pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<RecordPage>, RecordsError> {
    let filter = RecordFilter::new(query.q);

    let total_results = records::count_matching(&state.db, &filter)
        .await
        .map_err(|e| RecordsError::Database(e.to_string()))?;

    let pagination = calculate_pagination(total_results, query.page);

    let found = records::search_records(&state.db, &filter, PAGE_SIZE, pagination.offset)
        .await
        .map_err(|e| RecordsError::Database(e.to_string()))?;

    tracing::debug!(
        term = filter.term(),
        total_results,
        page = pagination.page,
        "Record search"
    );

    Ok(Json(RecordPage {
        query: filter.term().to_string(),
        total_results,
        page: pagination.page,
        page_size: PAGE_SIZE,
        total_pages: pagination.total_pages,
        records: found.into_iter().map(RecordView::from).collect(),
    }))
}

/// GET /api/records/:id
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RecordView>, RecordsError> {
    let record = records::get_record(&state.db, id)
        .await
        .map_err(|e| RecordsError::Database(e.to_string()))?
        .ok_or(RecordsError::NotFound(id))?;

    Ok(Json(RecordView::from(record)))
}

#[derive(Debug)]
pub enum RecordsError {
    NotFound(i64),
    Database(String),
}

impl IntoResponse for RecordsError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            RecordsError::NotFound(id) => (StatusCode::NOT_FOUND, format!("Record {} not found", id)),
            RecordsError::Database(msg) => {
                tracing::error!(error = %msg, "Record query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", msg))
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
