//! Persistence interfaces consumed by the ingest pipeline
//!
//! The pipeline only sees [`RecordStore`] and [`ImageStore`] handles, injected
//! at construction. Adapters:
//! - [`SqliteRecordStore`]: the production record store
//! - [`MemoryRecordStore`] / [`MemoryImageStore`]: in-process, for tests and dry runs
//! - [`LocalImageStore`]: photographs as files under a directory

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDateTime;
use lombada_common::{timestamp, Record, Result};

pub mod local;
pub mod memory;
pub mod sqlite;

pub use local::LocalImageStore;
pub use memory::{MemoryImageStore, MemoryRecordStore};
pub use sqlite::SqliteRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record, newest first (timestamp, then id, descending)
    async fn list(&self) -> Result<Vec<Record>>;

    /// New row; returns the record with its assigned id
    async fn insert(&self, record: &Record) -> Result<Record>;

    /// Insert, or enrichment-merge into the row with the same id
    async fn upsert_merge(&self, record: &Record) -> Result<Record>;

    async fn exists(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `data` under `key` and return the URL it is reachable at
    async fn put(&self, key: &str, data: Bytes) -> Result<String>;
}

/// Storage key for a matched photograph: `<YYYYMMDD>/<match key>_<name>`
///
/// The original filename is reduced to `A-Za-z0-9._-`; anything else
/// becomes `_`.
pub fn image_key(time: &NaiveDateTime, original_name: &str) -> String {
    let sanitized: String = original_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "{}/{}_{}",
        time.format("%Y%m%d"),
        timestamp::to_match_key(time),
        sanitized
    )
}

/// Join a public prefix and a key with exactly one `/`
pub(crate) fn public_url(prefix: &str, key: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), key.trim_start_matches('/'))
}
