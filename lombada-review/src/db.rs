//! Read-only database access

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

/// Connect to the records database in read-only mode
///
/// The ingest service creates the file; this service never writes to it.
pub async fn connect_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        anyhow::bail!(
            "Database not found: {}\nRun `lombada-ingest check` once to create it.",
            db_path.display()
        );
    }

    let db_url = format!("sqlite://{}?mode=ro", db_path.display());

    SqlitePool::connect(&db_url)
        .await
        .context("Failed to connect to database in read-only mode")
}
