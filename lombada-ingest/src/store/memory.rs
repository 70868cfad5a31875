//! In-process stores
//!
//! Same observable behaviour as the durable adapters, without touching disk.

use async_trait::async_trait;
use bytes::Bytes;
use lombada_common::{Error, Record, Result};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{public_url, ImageStore, RecordStore};

#[derive(Debug, Default)]
struct RecordTable {
    rows: BTreeMap<i64, Record>,
    last_id: i64,
}

impl RecordTable {
    fn insert(&mut self, record: &Record) -> Result<Record> {
        let id = match record.id {
            Some(id) if self.rows.contains_key(&id) => {
                return Err(Error::InvalidInput(format!("record {} already exists", id)));
            }
            Some(id) => id,
            None => self.last_id + 1,
        };
        self.last_id = self.last_id.max(id);

        let mut stored = record.clone();
        stored.id = Some(id);
        self.rows.insert(id, stored.clone());
        Ok(stored)
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    table: RwLock<RecordTable>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.rows.is_empty()
    }

    pub async fn get(&self, id: i64) -> Option<Record> {
        self.table.read().await.rows.get(&id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list(&self) -> Result<Vec<Record>> {
        let table = self.table.read().await;
        let mut records: Vec<Record> = table.rows.values().cloned().collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn insert(&self, record: &Record) -> Result<Record> {
        self.table.write().await.insert(record)
    }

    async fn upsert_merge(&self, record: &Record) -> Result<Record> {
        let id = record
            .id
            .ok_or_else(|| Error::InvalidInput("upsert_merge requires a record id".to_string()))?;

        let mut table = self.table.write().await;
        match table.rows.get_mut(&id) {
            Some(existing) => {
                existing.merge_enrichment(record);
                Ok(existing.clone())
            }
            None => table.insert(record),
        }
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        Ok(self.table.read().await.rows.contains_key(&id))
    }
}

#[derive(Debug)]
struct ImageHolder {
    remaining_capacity: usize,
    files: HashMap<String, Bytes>,
}

/// Photographs kept in a map; optionally bounded in total bytes
#[derive(Debug)]
pub struct MemoryImageStore {
    url_prefix: String,
    files: RwLock<ImageHolder>,
}

impl MemoryImageStore {
    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self::with_capacity(url_prefix, usize::MAX)
    }

    pub fn with_capacity(url_prefix: impl Into<String>, capacity: usize) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            files: RwLock::new(ImageHolder {
                remaining_capacity: capacity,
                files: HashMap::new(),
            }),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.files.read().await.files.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.files.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.files.is_empty()
    }
}

impl Default for MemoryImageStore {
    fn default() -> Self {
        Self::new("memory://")
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        let mut holder = self.files.write().await;

        let freed = holder.files.get(key).map(|f| f.len()).unwrap_or(0);
        let available = holder.remaining_capacity.saturating_add(freed);
        if data.len() > available {
            return Err(Error::Internal(format!(
                "no space left for '{}' ({} bytes)",
                key,
                data.len()
            )));
        }

        holder.remaining_capacity = available - data.len();
        holder.files.insert(key.to_string(), data);
        tracing::debug!(key, "Stored image in memory");

        Ok(public_url(&self.url_prefix, key))
    }
}
