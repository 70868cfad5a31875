//! lombada-review library - record review service
//!
//! Read-only HTTP API over the records database, backing the dashboard:
//! search, paging, single-record inspection, health and build info.

use axum::Router;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod pagination;

/// Stored photographs served alongside the API
#[derive(Debug, Clone)]
pub struct Uploads {
    /// URL prefix the ingest service wrote into `image_url` (e.g. `/uploads`)
    pub url_prefix: String,
    pub dir: PathBuf,
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (read-only)
    pub db: SqlitePool,
    pub uploads: Option<Uploads>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self { db, uploads: None }
    }

    pub fn with_uploads(mut self, url_prefix: impl Into<String>, dir: PathBuf) -> Self {
        self.uploads = Some(Uploads {
            url_prefix: url_prefix.into(),
            dir,
        });
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let mut router = Router::new()
        .route("/api/records", get(api::list_records))
        .route("/api/records/:id", get(api::get_record))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes());

    // Only local paths can be served; an absolute URL prefix points elsewhere
    if let Some(uploads) = &state.uploads {
        let prefix = uploads.url_prefix.trim_end_matches('/');
        if prefix.starts_with('/') && prefix.len() > 1 {
            router = router.nest_service(prefix, ServeDir::new(&uploads.dir));
        }
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
