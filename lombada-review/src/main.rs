//! lombada-review - read-only record review service
//!
//! Serves the records database to the dashboard: search, paging, single
//! record inspection, stored photographs, health and build info.

use anyhow::{Context, Result};
use clap::Parser;
use lombada_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use lombada_review::{build_router, db, AppState};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "lombada-review", version, about = "Read-only record review service")]
struct Cli {
    /// Configuration file (overrides LOMBADA_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root folder holding the database and stored images
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Listen address (overrides [review] bind)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TomlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    lombada_common::logging::init_tracing(&config.logging.level)?;

    info!(
        "Starting lombada-review v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(cli.root_folder, &config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = config.database_path(initializer.root_folder());
    info!("Database path: {}", db_path.display());

    let pool = match db::connect_readonly(&db_path).await {
        Ok(pool) => {
            info!("Connected to database (read-only)");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            return Err(e);
        }
    };

    let image_dir = config.image_dir(initializer.root_folder());
    let state = AppState::new(pool).with_uploads(config.ingest.public_url_prefix.clone(), image_dir);
    let app = build_router(state);

    let bind = cli.bind.unwrap_or_else(|| config.review.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("lombada-review listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
