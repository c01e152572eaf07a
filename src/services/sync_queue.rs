//! Durable operation queue.
//!
//! Every local mutation lands here before anything touches the network.
//! Entries are drained strictly oldest-first by the sync processor and
//! removed when a push succeeds or the retry cap is exhausted.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{EntityType, Operation, QueuedOperation};
use crate::services::entity_store;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp.
fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Record a local mutation: apply it to the local store and append it to
/// the durable queue.
///
/// Create/Update write the snapshot through immediately; Delete removes
/// the snapshot optimistically so reads never see a pending-delete entity.
/// A storage failure here is a hard error - the mutation is never silently
/// dropped.
///
/// # Returns
/// The created queue entry with its assigned ID
pub async fn enqueue_mutation(
    pool: &DbPool,
    operation: Operation,
    entity_type: EntityType,
    entity_id: &str,
    payload: Option<&serde_json::Value>,
) -> Result<QueuedOperation, AppError> {
    match operation {
        Operation::Create | Operation::Update => {
            let payload = payload.ok_or_else(|| {
                AppError::invalid_input(format!("{} requires a payload", operation))
            })?;
            entity_store::save_entity(pool, entity_type, entity_id, payload).await?;
        }
        Operation::Delete => {
            // Optimistic local delete
            entity_store::delete_entity(pool, entity_type, entity_id).await?;
        }
    }

    let entry = sqlx::query_as::<_, QueuedOperation>(
        r#"
        INSERT INTO sync_queue (operation, entity_type, entity_id, payload, retry_count, created_at)
        VALUES (?, ?, ?, ?, 0, ?)
        RETURNING id, operation, entity_type, entity_id, payload, retry_count, last_error, created_at
        "#,
    )
    .bind(operation.to_string())
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(payload.map(|p| p.to_string()))
    .bind(now())
    .fetch_one(pool)
    .await?;

    Ok(entry)
}

/// Get the full queue in enqueue order.
pub async fn list_queue(pool: &DbPool) -> Result<Vec<QueuedOperation>, AppError> {
    let entries = sqlx::query_as::<_, QueuedOperation>(
        r#"
        SELECT id, operation, entity_type, entity_id, payload, retry_count, last_error, created_at
        FROM sync_queue
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

/// Remove one queue entry.
///
/// Idempotent: removing an already-removed entry is a no-op, so retried
/// processing paths can call this twice safely.
pub async fn remove_from_queue(pool: &DbPool, queue_id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sync_queue WHERE id = ?")
        .bind(queue_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Empty the queue entirely (explicit "discard offline changes").
pub async fn clear_queue(pool: &DbPool) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM sync_queue").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Count pending entries, used by UI badges.
pub async fn queue_depth(pool: &DbPool) -> Result<i64, AppError> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue")
        .fetch_one(pool)
        .await?;

    Ok(count.0)
}

/// Durably record a failed push attempt against a queue entry.
///
/// Increments `retry_count` immediately (not once per drain pass), so an
/// entry surviving many short online windows still reaches the cap.
///
/// # Returns
/// The new retry count
pub async fn record_failed_attempt(
    pool: &DbPool,
    queue_id: i64,
    error: &str,
) -> Result<i64, AppError> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE sync_queue SET retry_count = retry_count + 1, last_error = ?
        WHERE id = ?
        RETURNING retry_count
        "#,
    )
    .bind(error)
    .bind(queue_id)
    .fetch_optional(pool)
    .await?;

    let (retry_count,) = row.ok_or_else(|| {
        AppError::not_found_with_id("QueuedOperation", queue_id.to_string())
    })?;

    Ok(retry_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;
    use tempfile::tempdir;

    async fn setup_test_db() -> DbPool {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        std::mem::forget(dir);

        db::initialize(&db_path).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_returns_entry() {
        let pool = setup_test_db().await;

        let entry = enqueue_mutation(
            &pool,
            Operation::Create,
            EntityType::Task,
            "t-1",
            Some(&json!({"title": "Write intro"})),
        )
        .await
        .unwrap();

        assert_eq!(entry.operation, "create");
        assert_eq!(entry.entity_type, "task");
        assert_eq!(entry.entity_id, "t-1");
        assert_eq!(entry.retry_count, 0);
        assert!(entry.payload.is_some());
    }

    #[tokio::test]
    async fn test_enqueue_writes_through_to_store() {
        let pool = setup_test_db().await;

        enqueue_mutation(
            &pool,
            Operation::Create,
            EntityType::Paper,
            "42",
            Some(&json!({"title": "A paper"})),
        )
        .await
        .unwrap();

        let record = entity_store::get_entity(&pool, EntityType::Paper, "42")
            .await
            .unwrap();
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn test_enqueue_delete_is_optimistic() {
        let pool = setup_test_db().await;

        entity_store::save_entity(&pool, EntityType::Paper, "42", &json!({"title": "A paper"}))
            .await
            .unwrap();

        enqueue_mutation(&pool, Operation::Delete, EntityType::Paper, "42", None)
            .await
            .unwrap();

        // The snapshot is gone immediately, before any remote push
        let record = entity_store::get_entity(&pool, EntityType::Paper, "42")
            .await
            .unwrap();
        assert!(record.is_none());
        assert_eq!(queue_depth(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_create_without_payload_fails() {
        let pool = setup_test_db().await;

        let result =
            enqueue_mutation(&pool, Operation::Create, EntityType::Task, "t-1", None).await;
        assert!(result.is_err());
        assert_eq!(queue_depth(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_queue_preserves_enqueue_order() {
        let pool = setup_test_db().await;

        for i in 0..5 {
            enqueue_mutation(
                &pool,
                Operation::Update,
                EntityType::Task,
                &format!("t-{}", i),
                Some(&json!({"n": i})),
            )
            .await
            .unwrap();
        }

        let queue = list_queue(&pool).await.unwrap();
        assert_eq!(queue.len(), 5);
        for (i, entry) in queue.iter().enumerate() {
            assert_eq!(entry.entity_id, format!("t-{}", i));
        }
        // IDs are strictly increasing
        assert!(queue.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_remove_from_queue_tolerates_double_removal() {
        let pool = setup_test_db().await;

        let entry = enqueue_mutation(
            &pool,
            Operation::Create,
            EntityType::Reminder,
            "r-1",
            Some(&json!({})),
        )
        .await
        .unwrap();

        remove_from_queue(&pool, entry.id).await.unwrap();
        // Second removal is a no-op
        remove_from_queue(&pool, entry.id).await.unwrap();

        assert_eq!(queue_depth(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_queue() {
        let pool = setup_test_db().await;

        for i in 0..3 {
            enqueue_mutation(
                &pool,
                Operation::Create,
                EntityType::Task,
                &format!("t-{}", i),
                Some(&json!({})),
            )
            .await
            .unwrap();
        }

        let removed = clear_queue(&pool).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(queue_depth(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_failed_attempt_increments() {
        let pool = setup_test_db().await;

        let entry = enqueue_mutation(
            &pool,
            Operation::Update,
            EntityType::Paper,
            "42",
            Some(&json!({"isFavorite": true})),
        )
        .await
        .unwrap();

        let count = record_failed_attempt(&pool, entry.id, "connection refused")
            .await
            .unwrap();
        assert_eq!(count, 1);

        let count = record_failed_attempt(&pool, entry.id, "timeout").await.unwrap();
        assert_eq!(count, 2);

        let queue = list_queue(&pool).await.unwrap();
        assert_eq!(queue[0].retry_count, 2);
        assert_eq!(queue[0].last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_record_failed_attempt_missing_entry() {
        let pool = setup_test_db().await;
        let result = record_failed_attempt(&pool, 999, "err").await;
        assert!(result.is_err());
    }
}
