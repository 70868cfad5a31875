//! SQLite record store

use async_trait::async_trait;
use lombada_common::db::records;
use lombada_common::{Record, Result};
use sqlx::SqlitePool;

use super::RecordStore;

#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn list(&self) -> Result<Vec<Record>> {
        records::list_records(&self.pool).await
    }

    async fn insert(&self, record: &Record) -> Result<Record> {
        records::insert_record(&self.pool, record).await
    }

    async fn upsert_merge(&self, record: &Record) -> Result<Record> {
        records::upsert_merge_record(&self.pool, record).await
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        records::record_exists(&self.pool, id).await
    }
}
