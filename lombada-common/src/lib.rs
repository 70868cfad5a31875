//! # Lombada Common Library
//!
//! Shared code for the lombada services:
//! - Record model and enrichment-only merge rule
//! - Timestamp codec (CSV text, canonical time, filename match key)
//! - Plate validation shared by every recognizer
//! - Configuration loading and root folder resolution
//! - SQLite schema and record queries
//! - Tracing initialisation

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod logging;
pub mod plate;
pub mod record;
pub mod timestamp;

pub use error::{Error, Result};
pub use record::{Record, RecordFilter};
