//! Record queries
//!
//! Timestamps are stored in the canonical `YYYY-MM-DD HH:MM:SS` text form so
//! that `ORDER BY timestamp` is chronological.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use crate::record::{Record, RecordFilter};
use crate::{timestamp, Error, Result};

const SELECT_RECORD: &str = r#"
    SELECT id, timestamp, speed, image_url, plate, plate_confidence, vehicle_type
    FROM records
"#;

/// Term bound as ?1; a blank term matches every row
const FILTER_CLAUSE: &str = r#"
    WHERE ?1 = ''
       OR instr(timestamp, ?1) > 0
       OR instr(CAST(speed AS TEXT), ?1) > 0
       OR instr(COALESCE(plate, ''), upper(?1)) > 0
"#;

const NEWEST_FIRST: &str = "ORDER BY timestamp DESC, id DESC";

fn record_from_row(row: &SqliteRow) -> Result<Record> {
    let ts_text: String = row.try_get("timestamp")?;
    let ts = timestamp::parse_canonical(&ts_text)
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))?;

    Ok(Record {
        id: Some(row.try_get("id")?),
        timestamp: ts,
        speed: row.try_get("speed")?,
        image_url: row.try_get("image_url")?,
        plate: row.try_get("plate")?,
        plate_confidence: row.try_get("plate_confidence")?,
        vehicle_type: row.try_get("vehicle_type")?,
    })
}

/// List every record, newest first
pub async fn list_records(pool: &SqlitePool) -> Result<Vec<Record>> {
    let rows = sqlx::query(&format!("{} {}", SELECT_RECORD, NEWEST_FIRST))
        .fetch_all(pool)
        .await?;

    rows.iter().map(record_from_row).collect()
}

/// Load one record by id
pub async fn get_record(pool: &SqlitePool, id: i64) -> Result<Option<Record>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_RECORD))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

pub async fn record_exists(pool: &SqlitePool, id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM records WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

async fn insert_with<'e, E>(executor: E, record: &Record) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    // A NULL id lets SQLite assign the next key
    let result = sqlx::query(
        r#"
        INSERT INTO records (id, timestamp, speed, image_url, plate, plate_confidence, vehicle_type)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id)
    .bind(timestamp::format(&record.timestamp))
    .bind(record.speed)
    .bind(&record.image_url)
    .bind(&record.plate)
    .bind(record.plate_confidence)
    .bind(&record.vehicle_type)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert a record as a new row
///
/// Returns the record with its (possibly store-assigned) id. Inserting an
/// explicit id that already exists fails with a constraint error.
pub async fn insert_record(pool: &SqlitePool, record: &Record) -> Result<Record> {
    let id = insert_with(pool, record).await?;
    tracing::debug!(id, timestamp = %timestamp::format(&record.timestamp), "Inserted record");

    let mut stored = record.clone();
    stored.id = Some(id);
    Ok(stored)
}

/// Insert, or enrichment-merge into the existing row with the same id
///
/// Read-modify-write runs inside one transaction. Returns the stored state.
pub async fn upsert_merge_record(pool: &SqlitePool, record: &Record) -> Result<Record> {
    let id = record
        .id
        .ok_or_else(|| Error::InvalidInput("upsert_merge requires a record id".to_string()))?;

    let mut tx = pool.begin().await?;

    let existing = sqlx::query(&format!("{} WHERE id = ?", SELECT_RECORD))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    let stored = match existing {
        Some(row) => {
            let mut current = record_from_row(&row)?;
            if current.merge_enrichment(record) {
                sqlx::query(
                    r#"
                    UPDATE records
                    SET image_url = ?, plate = ?, plate_confidence = ?, vehicle_type = ?,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = ?
                    "#,
                )
                .bind(&current.image_url)
                .bind(&current.plate)
                .bind(current.plate_confidence)
                .bind(&current.vehicle_type)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                tracing::debug!(id, "Merged enrichment into existing record");
            } else {
                tracing::debug!(id, "Record already enriched, nothing to merge");
            }
            current
        }
        None => {
            insert_with(&mut *tx, record).await?;
            tracing::debug!(id, "Inserted record with explicit id");
            record.clone()
        }
    };

    tx.commit().await?;
    Ok(stored)
}

/// Count records matching a dashboard search
pub async fn count_matching(pool: &SqlitePool, filter: &RecordFilter) -> Result<i64> {
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM records {}", FILTER_CLAUSE))
        .bind(filter.term())
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// One page of records matching a dashboard search, newest first
pub async fn search_records(
    pool: &SqlitePool,
    filter: &RecordFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<Record>> {
    let rows = sqlx::query(&format!(
        "{} {} {} LIMIT ?2 OFFSET ?3",
        SELECT_RECORD, FILTER_CLAUSE, NEWEST_FIRST
    ))
    .bind(filter.term())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Cheap connectivity probe against the records table
pub async fn ping(pool: &SqlitePool) -> Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_id() {
        let pool = open_in_memory().await.unwrap();

        let first = insert_record(&pool, &Record::new(at(10, 0, 0), 50)).await.unwrap();
        let second = insert_record(&pool, &Record::new(at(10, 0, 0), 55)).await.unwrap();

        assert!(first.id.is_some());
        assert!(second.id.is_some());
        assert_ne!(first.id, second.id, "same timestamp must still yield two rows");
        assert_eq!(list_records(&pool).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_explicit_id_and_exists() {
        let pool = open_in_memory().await.unwrap();

        let stored = insert_record(&pool, &Record::new(at(10, 0, 0), 50).with_id(42))
            .await
            .unwrap();

        assert_eq!(stored.id, Some(42));
        assert!(record_exists(&pool, 42).await.unwrap());
        assert!(!record_exists(&pool, 43).await.unwrap());

        let duplicate = insert_record(&pool, &Record::new(at(11, 0, 0), 60).with_id(42)).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_upsert_merge_fills_but_never_regresses() {
        let pool = open_in_memory().await.unwrap();

        let mut first = Record::new(at(10, 0, 0), 50).with_id(1);
        first.plate = Some("ABC1234".to_string());
        first.plate_confidence = 88.0;
        upsert_merge_record(&pool, &first).await.unwrap();

        let mut second = Record::new(at(10, 0, 0), 50).with_id(1);
        second.image_url = Some("/uploads/x.jpg".to_string());
        let merged = upsert_merge_record(&pool, &second).await.unwrap();

        assert_eq!(merged.plate.as_deref(), Some("ABC1234"));
        assert_eq!(merged.image_url.as_deref(), Some("/uploads/x.jpg"));

        let loaded = get_record(&pool, 1).await.unwrap().unwrap();
        assert_eq!(loaded, merged);
        assert_eq!(list_records(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_merge_requires_id() {
        let pool = open_in_memory().await.unwrap();
        let result = upsert_merge_record(&pool, &Record::new(at(10, 0, 0), 50)).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let pool = open_in_memory().await.unwrap();
        insert_record(&pool, &Record::new(at(9, 0, 0), 40)).await.unwrap();
        insert_record(&pool, &Record::new(at(12, 0, 0), 45)).await.unwrap();
        insert_record(&pool, &Record::new(at(10, 30, 0), 42)).await.unwrap();

        let speeds: Vec<i64> = list_records(&pool)
            .await
            .unwrap()
            .iter()
            .map(|r| r.speed)
            .collect();
        assert_eq!(speeds, vec![45, 42, 40]);
    }

    #[tokio::test]
    async fn test_search_matches_like_filter() {
        let pool = open_in_memory().await.unwrap();

        let mut plated = Record::new(at(9, 0, 0), 91);
        plated.plate = Some("QRS4F56".to_string());
        insert_record(&pool, &plated).await.unwrap();
        insert_record(&pool, &Record::new(at(10, 0, 0), 47)).await.unwrap();

        let filter = RecordFilter::new("rs4");
        assert_eq!(count_matching(&pool, &filter).await.unwrap(), 1);
        let hits = search_records(&pool, &filter, 100, 0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(filter.matches(&hits[0]));

        let everything = RecordFilter::new("  ");
        assert_eq!(count_matching(&pool, &everything).await.unwrap(), 2);

        let by_speed = search_records(&pool, &RecordFilter::new("47"), 100, 0).await.unwrap();
        assert_eq!(by_speed.len(), 1);
        assert_eq!(by_speed[0].speed, 47);
    }

    #[tokio::test]
    async fn test_search_pages() {
        let pool = open_in_memory().await.unwrap();
        for minute in 0..5 {
            insert_record(&pool, &Record::new(at(8, minute, 0), 30)).await.unwrap();
        }

        let page = search_records(&pool, &RecordFilter::default(), 2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].timestamp, at(8, 2, 0));
        assert_eq!(ping(&pool).await.unwrap(), 5);
    }
}
