//! Bounded log of recent sync operations.
//!
//! Queue entries dropped after exhausting their retries are recorded here,
//! along with drain/pull summaries. The table is pruned to a fixed number
//! of rows on every write.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{LogStatus, SyncLog};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp.
fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Append a log entry and prune old rows.
pub async fn record(
    pool: &DbPool,
    operation: &str,
    status: LogStatus,
    entity_type: Option<&str>,
    entity_id: Option<&str>,
    message: Option<String>,
    duration_ms: Option<i64>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO sync_log (operation, status, entity_type, entity_id, message, duration_ms, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(operation)
    .bind(status.to_string())
    .bind(entity_type)
    .bind(entity_id)
    .bind(&message)
    .bind(duration_ms)
    .bind(now())
    .execute(pool)
    .await?;

    // Prune old log entries (keep only MAX_ENTRIES)
    sqlx::query(
        r#"
        DELETE FROM sync_log WHERE id NOT IN (
            SELECT id FROM sync_log ORDER BY timestamp DESC, id DESC LIMIT ?
        )
        "#,
    )
    .bind(SyncLog::MAX_ENTRIES)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get recent log entries, newest first.
pub async fn recent(pool: &DbPool, limit: i64) -> Result<Vec<SyncLog>, AppError> {
    let entries = sqlx::query_as::<_, SyncLog>(
        r#"
        SELECT id, operation, status, entity_type, entity_id, message, duration_ms, timestamp
        FROM sync_log
        ORDER BY timestamp DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Get recent dropped-entry records, newest first.
pub async fn recent_drops(pool: &DbPool, limit: i64) -> Result<Vec<SyncLog>, AppError> {
    let entries = sqlx::query_as::<_, SyncLog>(
        r#"
        SELECT id, operation, status, entity_type, entity_id, message, duration_ms, timestamp
        FROM sync_log
        WHERE status = 'dropped'
        ORDER BY timestamp DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::tempdir;

    async fn setup_test_db() -> DbPool {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        std::mem::forget(dir);

        db::initialize(&db_path).await.unwrap()
    }

    #[tokio::test]
    async fn test_record_and_read() {
        let pool = setup_test_db().await;

        record(
            &pool,
            "drain",
            LogStatus::Success,
            None,
            None,
            Some("pushed 3".to_string()),
            Some(120),
        )
        .await
        .unwrap();

        let entries = recent(&pool, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, "drain");
        assert_eq!(entries[0].status_enum(), LogStatus::Success);
        assert_eq!(entries[0].duration_ms, Some(120));
    }

    #[tokio::test]
    async fn test_log_is_pruned() {
        let pool = setup_test_db().await;

        for i in 0..(SyncLog::MAX_ENTRIES + 20) {
            record(
                &pool,
                "push",
                LogStatus::Error,
                Some("paper"),
                Some(&i.to_string()),
                None,
                None,
            )
            .await
            .unwrap();
        }

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_log")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, SyncLog::MAX_ENTRIES);
    }

    #[tokio::test]
    async fn test_recent_drops_filters() {
        let pool = setup_test_db().await;

        record(&pool, "drain", LogStatus::Success, None, None, None, None)
            .await
            .unwrap();
        record(
            &pool,
            "push",
            LogStatus::Dropped,
            Some("paper"),
            Some("42"),
            Some("gave up after 3 attempts".to_string()),
            None,
        )
        .await
        .unwrap();

        let drops = recent_drops(&pool, 10).await.unwrap();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].entity_type.as_deref(), Some("paper"));
        assert_eq!(drops[0].entity_id.as_deref(), Some("42"));
    }
}
