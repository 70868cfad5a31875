//! Error types for lombada-ingest
//!
//! Severity decides where an error ends up:
//! - [`BatchInputError`] aborts the whole batch before any row is touched
//! - [`RowError`] (parse or storage) skips or degrades one row and is
//!   accumulated into the batch summary
//! - [`RecognitionError`] never leaves the recognizer boundary; it is logged
//!   and the row continues without a plate

use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::time::Duration;
use thiserror::Error;

/// Batch-level input problem; nothing is processed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchInputError {
    #[error("no CSV file supplied")]
    MissingCsv,

    #[error("file '{name}' is {size} bytes, exceeding the {max} byte limit")]
    Oversized { name: String, size: u64, max: u64 },

    #[error("CSV file '{name}' is not valid UTF-8")]
    InvalidEncoding { name: String },
}

/// A CSV row could not be turned into a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing {field} field")]
    MissingField { field: &'static str },

    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp { value: String },

    #[error("speed {value:?} is not an integer")]
    InvalidSpeed { value: String },

    #[error("id {value:?} is not an integer")]
    InvalidId { value: String },
}

/// Image or record write failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Row continues with no image reference
    #[error("image '{key}' not stored: {reason}")]
    Image { key: String, reason: String },

    /// Row is not persisted
    #[error("record not stored: {reason}")]
    Record { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowErrorKind {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Non-fatal per-row error, attributed to its 1-based CSV line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct RowError {
    pub line: usize,
    pub kind: RowErrorKind,
}

impl RowError {
    pub fn new(line: usize, kind: impl Into<RowErrorKind>) -> Self {
        Self {
            line,
            kind: kind.into(),
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self.kind, RowErrorKind::Parse(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.kind, RowErrorKind::Storage(_))
    }
}

impl Serialize for RowError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let category = match self.kind {
            RowErrorKind::Parse(_) => "parse",
            RowErrorKind::Storage(_) => "storage",
        };

        let mut state = serializer.serialize_struct("RowError", 3)?;
        state.serialize_field("line", &self.line)?;
        state.serialize_field("category", category)?;
        state.serialize_field("message", &self.kind.to_string())?;
        state.end()
    }
}

/// Plate recognition failed; mapped to "no plate" by the recognizer
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("vehicle detection failed: {0}")]
    Detection(String),

    #[error("image decoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("recognizer timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
