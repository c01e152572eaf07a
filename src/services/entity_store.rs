//! Entity snapshot store and sync metadata.
//!
//! Cached entity data lives in the `entities` table, one row per
//! (entity_type, id), always replaced wholesale. Small metadata values
//! such as the last-sync checkpoint live in `sync_meta`.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{EntityRecord, EntityType, NewEntity};
use std::time::{SystemTime, UNIX_EPOCH};

/// Metadata key holding the pull checkpoint (Unix seconds).
pub const META_LAST_SYNC_AT: &str = "last_sync_at";

/// Get the current Unix timestamp.
fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Upsert one entity snapshot. Idempotent; the stored row is replaced
/// wholesale, never partially updated.
pub async fn save_entity(
    pool: &DbPool,
    entity_type: EntityType,
    id: &str,
    payload: &serde_json::Value,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO entities (entity_type, id, payload, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(entity_type, id) DO UPDATE SET
            payload = excluded.payload,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(entity_type.as_str())
    .bind(id)
    .bind(payload.to_string())
    .bind(now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Best-effort bulk upsert, used by full sync.
///
/// Each record is written independently; a failing record is logged and
/// skipped so it cannot roll back the others. Returns the number of
/// records written.
pub async fn save_entities(
    pool: &DbPool,
    entity_type: EntityType,
    records: &[NewEntity],
) -> Result<usize, AppError> {
    let mut written = 0;

    for record in records {
        match save_entity(pool, entity_type, &record.id, &record.payload).await {
            Ok(()) => written += 1,
            Err(e) => {
                log::warn!(
                    "Failed to write {} '{}' during bulk save: {}",
                    entity_type,
                    record.id,
                    e
                );
            }
        }
    }

    Ok(written)
}

/// Look up one entity snapshot.
pub async fn get_entity(
    pool: &DbPool,
    entity_type: EntityType,
    id: &str,
) -> Result<Option<EntityRecord>, AppError> {
    let record = sqlx::query_as::<_, EntityRecord>(
        "SELECT entity_type, id, payload, updated_at FROM entities WHERE entity_type = ? AND id = ?",
    )
    .bind(entity_type.as_str())
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Get all snapshots of a type. Ordering is unspecified; callers sort.
pub async fn get_all_entities(
    pool: &DbPool,
    entity_type: EntityType,
) -> Result<Vec<EntityRecord>, AppError> {
    let records = sqlx::query_as::<_, EntityRecord>(
        "SELECT entity_type, id, payload, updated_at FROM entities WHERE entity_type = ?",
    )
    .bind(entity_type.as_str())
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Delete one entity snapshot. No-op if absent.
pub async fn delete_entity(
    pool: &DbPool,
    entity_type: EntityType,
    id: &str,
) -> Result<(), AppError> {
    sqlx::query("DELETE FROM entities WHERE entity_type = ? AND id = ?")
        .bind(entity_type.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Remove every snapshot of a type. Used by destructive resets and the
/// full-replace sync path.
pub async fn clear_entities(pool: &DbPool, entity_type: EntityType) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM entities WHERE entity_type = ?")
        .bind(entity_type.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Count snapshots of a type.
pub async fn count_entities(pool: &DbPool, entity_type: EntityType) -> Result<i64, AppError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities WHERE entity_type = ?")
        .bind(entity_type.as_str())
        .fetch_one(pool)
        .await?;

    Ok(count.0)
}

/// Read a metadata value.
pub async fn get_meta(pool: &DbPool, key: &str) -> Result<Option<String>, AppError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM sync_meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|(value,)| value))
}

/// Write a metadata value.
pub async fn set_meta(pool: &DbPool, key: &str, value: &str) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO sync_meta (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

/// Read the pull checkpoint, defaulting to 0 when never synced.
pub async fn get_last_sync_at(pool: &DbPool) -> Result<i64, AppError> {
    Ok(get_meta(pool, META_LAST_SYNC_AT)
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// Advance the pull checkpoint.
pub async fn set_last_sync_at(pool: &DbPool, timestamp: i64) -> Result<(), AppError> {
    set_meta(pool, META_LAST_SYNC_AT, &timestamp.to_string()).await
}
