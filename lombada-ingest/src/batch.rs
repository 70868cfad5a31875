//! Upload batches
//!
//! The transport (form upload, CLI, ...) hands the pipeline one CSV blob and
//! any number of named image blobs, always as whole files. [`UploadBatch::validate`]
//! applies the batch-level checks before any row is looked at.

use anyhow::{Context, Result};
use bytes::Bytes;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::error::BatchInputError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One named file as delivered by the transport
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original filename (no directory part)
    pub name: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// CSV log plus photographs for one ingest run
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    pub csv: Option<UploadedFile>,
    pub images: Vec<UploadedFile>,
}

impl UploadBatch {
    pub fn new(csv: UploadedFile, images: Vec<UploadedFile>) -> Self {
        Self {
            csv: Some(csv),
            images,
        }
    }

    /// Batch-level checks; returns the CSV text on success
    ///
    /// Fails on a missing CSV, on any file larger than `max_file_bytes`, or on
    /// a CSV that is not UTF-8. A leading byte-order mark is dropped.
    pub fn validate(&self, max_file_bytes: u64) -> Result<&str, BatchInputError> {
        let csv = self.csv.as_ref().ok_or(BatchInputError::MissingCsv)?;

        for file in std::iter::once(csv).chain(self.images.iter()) {
            if file.size() > max_file_bytes {
                return Err(BatchInputError::Oversized {
                    name: file.name.clone(),
                    size: file.size(),
                    max: max_file_bytes,
                });
            }
        }

        let text = std::str::from_utf8(&csv.bytes).map_err(|_| BatchInputError::InvalidEncoding {
            name: csv.name.clone(),
        })?;

        Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
    }
}

/// Assemble a batch from a CSV path and an optional image directory
///
/// The directory is walked recursively; hidden entries are skipped and only
/// files with an image extension whose content sniffs as an image are kept.
pub fn load_batch(csv_path: &Path, images_dir: Option<&Path>) -> Result<UploadBatch> {
    let csv_bytes = std::fs::read(csv_path)
        .with_context(|| format!("Failed to read CSV file {}", csv_path.display()))?;
    let csv = UploadedFile::new(file_name_of(csv_path), csv_bytes);

    let images = match images_dir {
        Some(dir) => scan_images(dir)?,
        None => Vec::new(),
    };

    tracing::info!(
        csv = %csv.name,
        images = images.len(),
        "Loaded upload batch from disk"
    );

    Ok(UploadBatch::new(csv, images))
}

fn scan_images(dir: &Path) -> Result<Vec<UploadedFile>> {
    if !dir.is_dir() {
        anyhow::bail!("Image directory not found: {}", dir.display());
    }

    let mut images = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() || !has_image_extension(entry.path()) {
            continue;
        }

        let bytes = std::fs::read(entry.path())
            .with_context(|| format!("Failed to read image {}", entry.path().display()))?;

        if !infer::is_image(&bytes) {
            tracing::warn!(file = %entry.path().display(), "Skipping file that is not an image");
            continue;
        }

        images.push(UploadedFile::new(file_name_of(entry.path()), bytes));
    }

    Ok(images)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
