//! lombada-ingest library interface
//!
//! Pairs a tab-separated passage log with camera photographs, reads plates
//! and persists the combined records. Exposed as a library so the pipeline
//! can be driven from integration tests with in-memory stores.

pub mod batch;
pub mod error;
pub mod matcher;
pub mod pipeline;
pub mod recognizer;
pub mod rows;
pub mod store;

pub use batch::{load_batch, UploadBatch, UploadedFile};
pub use error::{BatchInputError, ParseError, RecognitionError, RowError, RowErrorKind, StorageError};
pub use pipeline::{IngestSummary, IngestionPipeline, PipelineConfig};
pub use recognizer::{build_recognizer, PlateReading, PlateRecognizer};
pub use store::{ImageStore, RecordStore};

/// Build identification captured by build.rs
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");
