//! lombada-ingest - passage log ingestion
//!
//! Loads a CSV log and a directory of photographs, runs the ingest pipeline
//! against the configured stores and prints the batch summary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lombada_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use lombada_common::db::{self, records};
use lombada_common::RecordFilter;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use lombada_ingest::store::{
    ImageStore, LocalImageStore, MemoryImageStore, MemoryRecordStore, RecordStore,
    SqliteRecordStore,
};
use lombada_ingest::{build_recognizer, load_batch, IngestionPipeline, PipelineConfig};

#[derive(Debug, Parser)]
#[command(name = "lombada-ingest", version, about = "Traffic camera record ingestion")]
struct Cli {
    /// Configuration file (overrides LOMBADA_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder holding the database and stored images
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest one batch: a CSV log plus a directory of photographs
    Ingest {
        #[arg(long)]
        csv: PathBuf,

        #[arg(long)]
        images: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Run against in-memory stores; nothing is written
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored records, newest first
    List {
        /// Filter by timestamp text, speed or plate
        #[arg(long)]
        search: Option<String>,

        #[arg(long, default_value_t = 100)]
        limit: i64,
    },

    /// Check that the record store is reachable
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TomlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    lombada_common::logging::init_tracing(&config.logging.level)?;

    info!(
        "Starting lombada-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        lombada_ingest::GIT_HASH,
        lombada_ingest::BUILD_TIMESTAMP,
        lombada_ingest::BUILD_PROFILE
    );

    let root_folder = RootFolderResolver::new(cli.root_folder.clone(), &config).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    let root_folder = initializer.root_folder().to_path_buf();
    info!("Root folder: {}", root_folder.display());

    match cli.command {
        Command::Ingest {
            csv,
            images,
            json,
            dry_run,
        } => run_ingest(&config, &root_folder, csv, images, json, dry_run).await,
        Command::List { search, limit } => run_list(&config, &root_folder, search, limit).await,
        Command::Check => run_check(&config, &root_folder).await,
    }
}

async fn run_ingest(
    config: &TomlConfig,
    root_folder: &std::path::Path,
    csv: PathBuf,
    images: Option<PathBuf>,
    json: bool,
    dry_run: bool,
) -> Result<()> {
    let batch = load_batch(&csv, images.as_deref())?;

    let (records, image_store): (Arc<dyn RecordStore>, Arc<dyn ImageStore>) = if dry_run {
        info!("Dry run: using in-memory stores");
        (
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryImageStore::new(config.ingest.public_url_prefix.clone())),
        )
    } else {
        let db_path = config.database_path(root_folder);
        info!("Database: {}", db_path.display());
        let pool = db::init_database_pool(&db_path).await?;

        let image_dir = config.image_dir(root_folder);
        info!("Image directory: {}", image_dir.display());
        let images = LocalImageStore::new(image_dir, config.ingest.public_url_prefix.clone()).await?;

        (Arc::new(SqliteRecordStore::new(pool)), Arc::new(images))
    };

    let pipeline = IngestionPipeline::new(
        PipelineConfig::from(&config.ingest),
        records,
        image_store,
        build_recognizer(config),
    );

    let summary = pipeline.ingest(&batch).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Processed {} record(s), {} with image",
            summary.records_processed, summary.records_with_image
        );
        for error in &summary.errors {
            println!("  {}", error);
        }
    }

    Ok(())
}

async fn run_list(
    config: &TomlConfig,
    root_folder: &std::path::Path,
    search: Option<String>,
    limit: i64,
) -> Result<()> {
    let pool = db::init_database_pool(&config.database_path(root_folder)).await?;
    let filter = RecordFilter::new(search.as_deref().unwrap_or_default());

    let found = records::search_records(&pool, &filter, limit.max(0), 0).await?;
    for record in &found {
        println!("{}", serde_json::to_string(record)?);
    }

    let total = records::count_matching(&pool, &filter).await?;
    info!(shown = found.len(), total, "Listed records");
    Ok(())
}

async fn run_check(config: &TomlConfig, root_folder: &std::path::Path) -> Result<()> {
    let db_path = config.database_path(root_folder);
    let pool = db::init_database_pool(&db_path).await?;

    let total = records::ping(&pool)
        .await
        .with_context(|| format!("Record store at {} is not reachable", db_path.display()))?;

    println!("ok: {} record(s) in {}", total, db_path.display());
    Ok(())
}
