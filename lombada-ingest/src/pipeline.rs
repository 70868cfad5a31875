//! Ingestion pipeline
//!
//! One call to [`IngestionPipeline::ingest`] processes one upload batch:
//!
//! 1. Validate the batch (missing CSV, oversized file, encoding); abort on failure
//! 2. Parse CSV rows; malformed lines become row errors
//! 3. Per row, concurrently up to `max_concurrent_rows` (results kept in row order):
//!    match an image by key, recognize the plate, store the image
//! 4. Persist records one at a time, in row order (insert or upsert-merge by
//!    id policy)
//! 5. Report counts and every accumulated row error
//!
//! Row-level failures never abort the batch. The pipeline keeps no state
//! between calls.

use futures::stream::{self, StreamExt};
use lombada_common::config::IngestSettings;
use lombada_common::record::IdPolicy;
use lombada_common::Record;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

use crate::batch::{UploadBatch, UploadedFile};
use crate::error::{BatchInputError, RowError, StorageError};
use crate::matcher::ImageIndex;
use crate::recognizer::{recognize_within, PlateRecognizer};
use crate::rows::{parse_rows, CsvRow};
use crate::store::{image_key, ImageStore, RecordStore};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub id_policy: IdPolicy,
    /// Per-file limit for the CSV and each image
    pub max_file_bytes: u64,
    /// Upper bound for one recognizer call
    pub recognizer_timeout: Duration,
    /// Rows enriched concurrently
    pub max_concurrent_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&IngestSettings::default())
    }
}

impl From<&IngestSettings> for PipelineConfig {
    fn from(settings: &IngestSettings) -> Self {
        Self {
            id_policy: settings.id_policy,
            max_file_bytes: settings.max_file_bytes,
            recognizer_timeout: Duration::from_secs(settings.recognizer_timeout_secs),
            max_concurrent_rows: settings.max_concurrent_rows.max(1),
        }
    }
}

/// Result of one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    /// True whenever the batch was not aborted
    pub success: bool,
    /// Rows persisted
    pub records_processed: usize,
    /// Persisted records now pointing at a photograph stored in this batch
    pub records_with_image: usize,
    /// Row errors ordered by line
    pub errors: Vec<RowError>,
}

/// A row after matching, recognition and image upload
struct EnrichedRow {
    line: usize,
    record: Record,
    /// URL of the photograph stored for this row in this batch
    stored_url: Option<String>,
    image_error: Option<RowError>,
}

pub struct IngestionPipeline {
    config: PipelineConfig,
    records: Arc<dyn RecordStore>,
    images: Arc<dyn ImageStore>,
    recognizer: Arc<dyn PlateRecognizer>,
}

impl IngestionPipeline {
    pub fn new(
        config: PipelineConfig,
        records: Arc<dyn RecordStore>,
        images: Arc<dyn ImageStore>,
        recognizer: Arc<dyn PlateRecognizer>,
    ) -> Self {
        Self {
            config,
            records,
            images,
            recognizer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one upload batch
    ///
    /// Only batch-level input problems are returned as `Err`; everything
    /// that goes wrong with individual rows ends up in the summary.
    pub async fn ingest(&self, batch: &UploadBatch) -> Result<IngestSummary, BatchInputError> {
        let text = match batch.validate(self.config.max_file_bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Upload batch rejected");
                return Err(e);
            }
        };

        let (rows, mut errors) = parse_rows(text, self.config.id_policy);
        let index = ImageIndex::build(batch.images.as_slice());

        info!(
            rows = rows.len(),
            images = batch.images.len(),
            recognizer = self.recognizer.name(),
            id_policy = %self.config.id_policy,
            "Starting ingest batch"
        );

        let enriched: Vec<EnrichedRow> = stream::iter(rows.iter())
            .map(|row| {
                let image = index.get(&row.match_key());
                self.enrich(row, image)
            })
            .buffered(self.config.max_concurrent_rows.max(1))
            .collect()
            .await;

        let mut records_processed = 0;
        let mut records_with_image = 0;

        for row in enriched {
            if let Some(e) = row.image_error {
                errors.push(e);
            }

            match self.persist(&row.record).await {
                Ok(stored) => {
                    debug!(line = row.line, id = ?stored.id, "Record persisted");
                    records_processed += 1;
                    // A merge keeps an earlier image; only count the one this row wrote
                    if row.stored_url.is_some() && stored.image_url == row.stored_url {
                        records_with_image += 1;
                    }
                }
                Err(e) => {
                    warn!(line = row.line, error = %e, "Failed to persist record");
                    errors.push(RowError::new(
                        row.line,
                        StorageError::Record {
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }

        errors.sort_by_key(|e| e.line);

        info!(
            records_processed,
            records_with_image,
            errors = errors.len(),
            "Ingest batch finished"
        );

        Ok(IngestSummary {
            success: true,
            records_processed,
            records_with_image,
            errors,
        })
    }

    async fn enrich(&self, row: &CsvRow, image: Option<&UploadedFile>) -> EnrichedRow {
        let mut enriched = EnrichedRow {
            line: row.line,
            record: row.to_record(),
            stored_url: None,
            image_error: None,
        };

        let Some(image) = image else {
            debug!(line = row.line, key = %row.match_key(), "No image for row");
            return enriched;
        };

        let span = tracing::info_span!("row", line = row.line);
        let reading = recognize_within(
            self.recognizer.as_ref(),
            image,
            self.config.recognizer_timeout,
        )
        .instrument(span)
        .await;

        enriched.record.plate = reading.plate;
        enriched.record.plate_confidence = reading.confidence;
        enriched.record.vehicle_type = reading.vehicle_type;

        let key = image_key(&row.timestamp, &image.name);
        match self.images.put(&key, image.bytes.clone()).await {
            Ok(url) => {
                enriched.record.image_url = Some(url.clone());
                enriched.stored_url = Some(url);
            }
            Err(e) => {
                warn!(line = row.line, key = %key, error = %e, "Failed to store image");
                enriched.image_error = Some(RowError::new(
                    row.line,
                    StorageError::Image {
                        key,
                        reason: e.to_string(),
                    },
                ));
            }
        }

        enriched
    }

    async fn persist(&self, record: &Record) -> lombada_common::Result<Record> {
        match self.config.id_policy {
            IdPolicy::Explicit => self.records.upsert_merge(record).await,
            IdPolicy::StoreAssigned => self.records.insert(record).await,
        }
    }
}
