//! End-to-end ingest pipeline tests
//!
//! Drive [`IngestionPipeline`] with in-memory and SQLite stores and check the
//! batch-level guarantees: partial failure, exact matching, idempotent
//! explicit-id merges and batch rejection.

use async_trait::async_trait;
use bytes::Bytes;
use lombada_common::db::{open_in_memory, records};
use lombada_common::record::IdPolicy;
use lombada_common::{Error, Record};
use lombada_ingest::recognizer::{NullRecognizer, PlateReading};
use lombada_ingest::store::{ImageStore, MemoryImageStore, MemoryRecordStore, RecordStore, SqliteRecordStore};
use lombada_ingest::{
    load_batch, BatchInputError, IngestionPipeline, PipelineConfig, PlateRecognizer,
    RecognitionError, RowErrorKind, StorageError, UploadBatch, UploadedFile,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Reads a fixed plate from any photograph and counts its calls
struct StubRecognizer {
    plate: &'static str,
    calls: AtomicUsize,
}

impl StubRecognizer {
    fn new(plate: &'static str) -> Self {
        Self {
            plate,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PlateRecognizer for StubRecognizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn try_recognize(&self, _image: &UploadedFile) -> Result<PlateReading, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PlateReading::found(self.plate.to_string(), 88.0, Some("Automóvel".to_string())))
    }
}

/// Always errors
struct BrokenRecognizer;

#[async_trait]
impl PlateRecognizer for BrokenRecognizer {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn try_recognize(&self, _image: &UploadedFile) -> Result<PlateReading, RecognitionError> {
        Err(RecognitionError::Ocr("tesseract not installed".to_string()))
    }
}

/// Never finishes within any reasonable timeout
struct HangingRecognizer;

#[async_trait]
impl PlateRecognizer for HangingRecognizer {
    fn name(&self) -> &'static str {
        "hanging"
    }

    async fn try_recognize(&self, _image: &UploadedFile) -> Result<PlateReading, RecognitionError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(PlateReading::none())
    }
}

/// Rejects every write
struct FailingImageStore;

#[async_trait]
impl ImageStore for FailingImageStore {
    async fn put(&self, _key: &str, _data: Bytes) -> lombada_common::Result<String> {
        Err(Error::Internal("bucket unavailable".to_string()))
    }
}

/// Accepts nothing
struct FailingRecordStore;

#[async_trait]
impl RecordStore for FailingRecordStore {
    async fn list(&self) -> lombada_common::Result<Vec<Record>> {
        Ok(Vec::new())
    }

    async fn insert(&self, _record: &Record) -> lombada_common::Result<Record> {
        Err(Error::Internal("disk full".to_string()))
    }

    async fn upsert_merge(&self, _record: &Record) -> lombada_common::Result<Record> {
        Err(Error::Internal("disk full".to_string()))
    }

    async fn exists(&self, _id: i64) -> lombada_common::Result<bool> {
        Ok(false)
    }
}

fn config(policy: IdPolicy) -> PipelineConfig {
    PipelineConfig {
        id_policy: policy,
        ..PipelineConfig::default()
    }
}

fn csv(text: &str) -> UploadedFile {
    UploadedFile::new("lombada.csv", text.to_string())
}

fn photo(name: &str) -> UploadedFile {
    UploadedFile::new(name, vec![0xff, 0xd8, 0xff, 0xe0])
}

fn memory_pipeline(
    policy: IdPolicy,
    recognizer: Arc<dyn PlateRecognizer>,
) -> (IngestionPipeline, Arc<MemoryRecordStore>, Arc<MemoryImageStore>) {
    let records = Arc::new(MemoryRecordStore::new());
    let images = Arc::new(MemoryImageStore::new("/uploads"));
    let pipeline = IngestionPipeline::new(config(policy), records.clone(), images.clone(), recognizer);
    (pipeline, records, images)
}

#[tokio::test]
async fn test_rows_without_images_are_bare_records() {
    let (pipeline, records, images) =
        memory_pipeline(IdPolicy::StoreAssigned, Arc::new(StubRecognizer::new("ABC1234")));

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\n2024-03-15 14:31:05\t63\n"),
        vec![],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.records_processed, 2);
    assert_eq!(summary.records_with_image, 0);
    assert!(summary.errors.is_empty());
    assert!(images.is_empty().await);

    for record in records.list().await.unwrap() {
        assert_eq!(record.image_url, None);
        assert_eq!(record.plate, None);
        assert_eq!(record.plate_confidence, 0.0);
        assert_eq!(record.vehicle_type, None);
    }
}

#[tokio::test]
async fn test_matching_is_exact() {
    let recognizer = Arc::new(StubRecognizer::new("ABC1D23"));
    let (pipeline, records, images) = memory_pipeline(IdPolicy::StoreAssigned, recognizer.clone());

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\n"),
        vec![photo("2024-03-15 14 30 23.jpg"), photo("2024-03-15 14 30 22.jpg")],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();

    assert_eq!(summary.records_with_image, 1);
    assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(images.len().await, 1);

    let stored = records.list().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].image_url.as_deref(),
        Some("/uploads/20240315/20240315143022_2024-03-15_14_30_22.jpg")
    );
    assert_eq!(stored[0].plate.as_deref(), Some("ABC1D23"));
    assert_eq!(stored[0].plate_confidence, 88.0);
}

#[tokio::test]
async fn test_one_malformed_line_in_five() {
    let (pipeline, records, _) = memory_pipeline(IdPolicy::StoreAssigned, Arc::new(NullRecognizer));

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\n\
             2024-03-15 14:30:40\t61\n\
             2024-03-15 14:31:02\n\
             2024-03-15 14:31:30\t48\n\
             2024-03-15 14:32:11\t82\n"),
        vec![],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.records_processed, 4);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].line, 3);
    assert!(summary.errors[0].is_parse());
    assert_eq!(records.len().await, 4);
}

#[tokio::test]
async fn test_explicit_ids_are_idempotent() {
    let recognizer = Arc::new(StubRecognizer::new("XYZ9876"));
    let (pipeline, records, _) = memory_pipeline(IdPolicy::Explicit, recognizer);

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\t101\n2024-03-15 14:31:00\t62\t102\n"),
        vec![photo("20240315143022.jpg")],
    );

    let first = pipeline.ingest(&batch).await.unwrap();
    assert_eq!(first.records_processed, 2);
    let before = records.list().await.unwrap();

    // Same log again, this time without photographs
    let replay = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\t101\n2024-03-15 14:31:00\t62\t102\n"),
        vec![],
    );
    let second = pipeline.ingest(&replay).await.unwrap();
    assert_eq!(second.records_processed, 2);
    assert_eq!(second.records_with_image, 0);

    let after = records.list().await.unwrap();
    assert_eq!(after.len(), 2, "re-run must not duplicate records");
    assert_eq!(before, after, "re-run must not regress filled fields");

    let enriched = records.get(101).await.unwrap();
    assert_eq!(enriched.plate.as_deref(), Some("XYZ9876"));
    assert!(enriched.image_url.is_some());
}

#[tokio::test]
async fn test_merge_fills_missing_image_later() {
    let (pipeline, records, _) = memory_pipeline(IdPolicy::Explicit, Arc::new(NullRecognizer));

    let log = "2024-03-15 14:30:22\t57\t7\n";
    pipeline.ingest(&UploadBatch::new(csv(log), vec![])).await.unwrap();
    assert_eq!(records.get(7).await.unwrap().image_url, None);

    let summary = pipeline
        .ingest(&UploadBatch::new(csv(log), vec![photo("2024-03-15 14 30 22.jpg")]))
        .await
        .unwrap();

    assert_eq!(summary.records_with_image, 1);
    assert!(records.get(7).await.unwrap().image_url.is_some());
    assert_eq!(records.len().await, 1);
}

#[tokio::test]
async fn test_replay_with_new_photo_keeps_first_image() {
    let (pipeline, records, _) = memory_pipeline(IdPolicy::Explicit, Arc::new(NullRecognizer));
    let log = "2024-03-15 14:30:22\t57\t7\n";

    let first = pipeline
        .ingest(&UploadBatch::new(csv(log), vec![photo("20240315143022.jpg")]))
        .await
        .unwrap();
    assert_eq!(first.records_with_image, 1);
    let before = records.get(7).await.unwrap().image_url;

    let second = pipeline
        .ingest(&UploadBatch::new(csv(log), vec![photo("2024-03-15 14 30 22.jpg")]))
        .await
        .unwrap();

    assert_eq!(second.records_processed, 1);
    assert_eq!(second.records_with_image, 0, "record kept its earlier image");
    assert_eq!(records.get(7).await.unwrap().image_url, before);
    assert_eq!(
        before.as_deref(),
        Some("/uploads/20240315/20240315143022_20240315143022.jpg")
    );
}

#[tokio::test]
async fn test_repeated_id_in_one_batch_keeps_enrichment() {
    let records = Arc::new(MemoryRecordStore::new());
    let config = PipelineConfig {
        id_policy: IdPolicy::Explicit,
        max_concurrent_rows: 4,
        ..PipelineConfig::default()
    };
    let pipeline = IngestionPipeline::new(
        config,
        records.clone(),
        Arc::new(MemoryImageStore::new("/uploads")),
        Arc::new(StubRecognizer::new("QRS4F56")),
    );

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\t9\n2024-03-15 14:31:00\t61\t9\n"),
        vec![photo("2024-03-15 14 31 00.jpg")],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();

    assert_eq!(summary.records_processed, 2);
    assert_eq!(summary.records_with_image, 1);
    assert!(summary.errors.is_empty());

    assert_eq!(records.len().await, 1);
    let stored = records.get(9).await.unwrap();
    assert_eq!(
        stored.image_url.as_deref(),
        Some("/uploads/20240315/20240315143100_2024-03-15_14_31_00.jpg")
    );
    assert_eq!(stored.plate.as_deref(), Some("QRS4F56"));
    assert_eq!(stored.speed, 57, "first row owns the base fields");
}

#[tokio::test]
async fn test_store_assigned_never_merges() {
    let (pipeline, records, _) = memory_pipeline(IdPolicy::StoreAssigned, Arc::new(NullRecognizer));

    let batch = UploadBatch::new(csv("2024-03-15 14:30:22\t57\n2024-03-15 14:30:22\t57\n"), vec![]);
    pipeline.ingest(&batch).await.unwrap();
    pipeline.ingest(&batch).await.unwrap();

    assert_eq!(records.len().await, 4);
}

#[tokio::test]
async fn test_oversized_file_aborts_batch() {
    let records = Arc::new(MemoryRecordStore::new());
    let pipeline = IngestionPipeline::new(
        PipelineConfig {
            max_file_bytes: 16,
            ..PipelineConfig::default()
        },
        records.clone(),
        Arc::new(MemoryImageStore::default()),
        Arc::new(NullRecognizer),
    );

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\n"),
        vec![UploadedFile::new("2024-03-15 14 30 22.jpg", vec![0u8; 17])],
    );
    let err = pipeline.ingest(&batch).await.unwrap_err();

    assert!(matches!(err, BatchInputError::Oversized { .. }));
    assert!(err.to_string().contains("2024-03-15 14 30 22.jpg"));
    assert!(records.is_empty().await);
}

#[tokio::test]
async fn test_missing_csv_aborts_batch() {
    let (pipeline, records, _) = memory_pipeline(IdPolicy::StoreAssigned, Arc::new(NullRecognizer));

    let batch = UploadBatch {
        csv: None,
        images: vec![photo("2024-03-15 14 30 22.jpg")],
    };
    assert_eq!(pipeline.ingest(&batch).await.unwrap_err(), BatchInputError::MissingCsv);
    assert!(records.is_empty().await);
}

#[tokio::test]
async fn test_recognizer_failure_is_not_a_row_error() {
    let (pipeline, records, _) = memory_pipeline(IdPolicy::StoreAssigned, Arc::new(BrokenRecognizer));

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\n"),
        vec![photo("2024-03-15 14 30 22.jpg")],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();

    assert!(summary.errors.is_empty());
    assert_eq!(summary.records_with_image, 1);
    let stored = records.list().await.unwrap();
    assert_eq!(stored[0].plate, None);
    assert_eq!(stored[0].plate_confidence, 0.0);
    assert!(stored[0].image_url.is_some());
}

#[tokio::test]
async fn test_recognizer_timeout_degrades() {
    let records = Arc::new(MemoryRecordStore::new());
    let pipeline = IngestionPipeline::new(
        PipelineConfig {
            recognizer_timeout: Duration::from_millis(50),
            ..PipelineConfig::default()
        },
        records.clone(),
        Arc::new(MemoryImageStore::default()),
        Arc::new(HangingRecognizer),
    );

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\n"),
        vec![photo("2024-03-15 14 30 22.jpg")],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();

    assert_eq!(summary.records_processed, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(records.list().await.unwrap()[0].plate, None);
}

#[tokio::test]
async fn test_image_store_failure_keeps_row() {
    let records = Arc::new(MemoryRecordStore::new());
    let pipeline = IngestionPipeline::new(
        PipelineConfig::default(),
        records.clone(),
        Arc::new(FailingImageStore),
        Arc::new(StubRecognizer::new("ABC1234")),
    );

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\n"),
        vec![photo("2024-03-15 14 30 22.jpg")],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();

    assert_eq!(summary.records_processed, 1);
    assert_eq!(summary.records_with_image, 0);
    assert_eq!(summary.errors.len(), 1);
    assert!(matches!(
        summary.errors[0].kind,
        RowErrorKind::Storage(StorageError::Image { .. })
    ));

    let stored = records.list().await.unwrap();
    assert_eq!(stored[0].image_url, None);
    assert_eq!(stored[0].plate.as_deref(), Some("ABC1234"));
}

#[tokio::test]
async fn test_record_store_failure_is_per_row() {
    let pipeline = IngestionPipeline::new(
        PipelineConfig::default(),
        Arc::new(FailingRecordStore),
        Arc::new(MemoryImageStore::default()),
        Arc::new(NullRecognizer),
    );

    let batch = UploadBatch::new(
        csv("2024-03-15 14:30:22\t57\nnot a row\n2024-03-15 14:31:00\t62\n"),
        vec![],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();

    assert!(summary.success);
    assert_eq!(summary.records_processed, 0);
    let lines: Vec<usize> = summary.errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![1, 2, 3]);
    assert!(summary.errors[0].is_storage());
    assert!(summary.errors[1].is_parse());
}

#[tokio::test]
async fn test_sqlite_store_end_to_end() {
    let pool = open_in_memory().await.unwrap();
    let pipeline = IngestionPipeline::new(
        config(IdPolicy::Explicit),
        Arc::new(SqliteRecordStore::new(pool.clone())),
        Arc::new(MemoryImageStore::new("/uploads")),
        Arc::new(StubRecognizer::new("QRS4F56")),
    );

    let batch = UploadBatch::new(
        csv("15/03/2024 14:30:22\t91\t1\n2024-03-15T14:35:00\t47\t2\n"),
        vec![photo("2024-03-15 14 30 22.jpg")],
    );
    let summary = pipeline.ingest(&batch).await.unwrap();
    assert_eq!(summary.records_processed, 2);
    pipeline.ingest(&batch).await.unwrap();

    let stored = records::list_records(&pool).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].id, Some(2), "newest first");
    assert!(stored[1].image_url.is_some());
    assert_eq!(stored[1].plate.as_deref(), Some("QRS4F56"));
    assert_eq!(stored[1].plate_confidence, 88.0);
    assert_eq!(stored[0].plate, None);
    assert!(records::record_exists(&pool, 1).await.unwrap());
}

#[tokio::test]
async fn test_load_batch_from_directory() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("log.csv");
    std::fs::write(&csv_path, "2024-03-15 14:30:22\t57\n").unwrap();

    let images = dir.path().join("photos");
    std::fs::create_dir_all(images.join("cam2")).unwrap();
    std::fs::create_dir_all(images.join(".thumbs")).unwrap();
    let jpeg = [0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    std::fs::write(images.join("2024-03-15 14 30 22.jpg"), jpeg).unwrap();
    std::fs::write(images.join("cam2").join("20240315143100.jpeg"), jpeg).unwrap();
    std::fs::write(images.join(".thumbs").join("20240315143022.jpg"), jpeg).unwrap();
    std::fs::write(images.join("readme.txt"), "not a photo").unwrap();
    std::fs::write(images.join("fake.jpg"), "not a photo either").unwrap();

    let batch = load_batch(&csv_path, Some(&images)).unwrap();

    assert_eq!(batch.csv.as_ref().unwrap().name, "log.csv");
    let mut names: Vec<&str> = batch.images.iter().map(|f| f.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["2024-03-15 14 30 22.jpg", "20240315143100.jpeg"]);
}

#[tokio::test]
async fn test_load_batch_missing_image_dir() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("log.csv");
    std::fs::write(&csv_path, "").unwrap();

    assert!(load_batch(&csv_path, Some(&dir.path().join("absent"))).is_err());
    assert!(load_batch(&csv_path, None).unwrap().images.is_empty());
}
