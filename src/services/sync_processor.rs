//! Queue drain processor.
//!
//! Walks the pending operation queue strictly oldest-first, pushing each
//! entry to the remote service. Successful entries are removed; failing
//! entries accumulate retry counts and are dropped (and logged) once they
//! reach the cap. At most one drain runs at a time.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{EntityType, LogStatus, Operation, QueuedOperation};
use crate::services::entity_store;
use crate::services::network_monitor::NetworkMonitor;
use crate::services::remote_client::RemoteApi;
use crate::services::sync_log;
use crate::services::sync_queue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp.
fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Outcome of a drain request.
#[derive(Debug)]
pub enum DrainOutcome {
    /// Another drain is in flight; this request was dropped, not queued.
    AlreadyDraining,

    /// The device is offline; the queue is untouched.
    Offline,

    /// No cloud session is configured; the engine is local-only.
    LocalOnly,

    /// A full pass over the queue snapshot ran.
    Completed(DrainSummary),
}

/// Counters from one completed drain pass.
#[derive(Debug, Default)]
pub struct DrainSummary {
    /// Entries for which a push was attempted.
    pub attempted: i64,

    /// Entries pushed and removed.
    pub pushed: i64,

    /// Entries that failed but remain queued for a later pass.
    pub failed: i64,

    /// Entries removed after exhausting their retries.
    pub dropped: i64,

    /// Per-entry error messages from this pass.
    pub errors: Vec<String>,
}

/// Issue exactly one remote call for a queued operation.
///
/// Create posts to the collection, Update puts by id, Delete removes by
/// id. Safe to call again for the same logical change; the remote side is
/// idempotent by contract.
pub async fn push_one(
    remote: &dyn RemoteApi,
    operation: Operation,
    entity_type: EntityType,
    entity_id: &str,
    payload: Option<&serde_json::Value>,
) -> Result<(), AppError> {
    match operation {
        Operation::Create => {
            let payload = payload.ok_or_else(|| {
                AppError::invalid_input(format!("create for {} is missing a payload", entity_id))
            })?;
            remote.create_entity(entity_type, entity_id, payload).await
        }
        Operation::Update => {
            let payload = payload.ok_or_else(|| {
                AppError::invalid_input(format!("update for {} is missing a payload", entity_id))
            })?;
            remote.update_entity(entity_type, entity_id, payload).await
        }
        Operation::Delete => remote.delete_entity(entity_type, entity_id).await,
    }
}

/// Clears the is-draining flag even when a pass errors out.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Serializes drain passes over the shared queue.
pub struct QueueProcessor {
    draining: AtomicBool,
}

impl Default for QueueProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueProcessor {
    pub fn new() -> Self {
        Self {
            draining: AtomicBool::new(false),
        }
    }

    /// Whether a drain pass is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Attempt to deliver every currently-queued operation, in order.
    ///
    /// Passing `None` for `remote` means no cloud session is active.
    /// Guard short-circuits (`AlreadyDraining`, `Offline`, `LocalOnly`)
    /// are outcomes, not errors; only storage failures return `Err`.
    ///
    /// Entries enqueued while the pass runs are not part of its snapshot
    /// and wait for the next externally-triggered drain.
    pub async fn drain(
        &self,
        pool: &DbPool,
        monitor: &NetworkMonitor,
        remote: Option<&dyn RemoteApi>,
    ) -> Result<DrainOutcome, AppError> {
        // At most one drain system-wide; a request arriving mid-flight is
        // dropped, not queued for later.
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Drain requested while one is in flight; skipping");
            return Ok(DrainOutcome::AlreadyDraining);
        }
        let _guard = DrainGuard(&self.draining);

        if !monitor.is_online() {
            log::debug!("Drain requested while offline; skipping");
            return Ok(DrainOutcome::Offline);
        }

        let Some(remote) = remote else {
            log::debug!("Drain requested without a cloud session; skipping");
            return Ok(DrainOutcome::LocalOnly);
        };

        let start = Instant::now();
        let queue = sync_queue::list_queue(pool).await?;
        let mut summary = DrainSummary::default();

        for entry in &queue {
            self.process_entry(pool, remote, entry, &mut summary).await?;
        }

        entity_store::set_last_sync_at(pool, now()).await?;

        let duration_ms = start.elapsed().as_millis() as i64;
        if !queue.is_empty() {
            let status = if summary.errors.is_empty() {
                LogStatus::Success
            } else {
                LogStatus::Error
            };
            sync_log::record(
                pool,
                "drain",
                status,
                None,
                None,
                Some(format!(
                    "pushed {}, failed {}, dropped {}",
                    summary.pushed, summary.failed, summary.dropped
                )),
                Some(duration_ms),
            )
            .await?;
        }

        log::info!(
            "Drain complete: {} pushed, {} failed, {} dropped ({}ms)",
            summary.pushed,
            summary.failed,
            summary.dropped,
            duration_ms
        );

        Ok(DrainOutcome::Completed(summary))
    }

    /// Push one queue entry and apply the retry/drop policy.
    ///
    /// Remote failures are absorbed into the summary so one entry never
    /// blocks the ones behind it; storage failures propagate.
    async fn process_entry(
        &self,
        pool: &DbPool,
        remote: &dyn RemoteApi,
        entry: &QueuedOperation,
        summary: &mut DrainSummary,
    ) -> Result<(), AppError> {
        // A row with an unrecognized type or unparseable payload can never
        // push; drop it instead of retrying forever.
        let Some(entity_type) = entry.entity_type_enum() else {
            self.drop_entry(pool, entry, "unknown entity type").await?;
            summary.dropped += 1;
            return Ok(());
        };

        let payload: Option<serde_json::Value> = match entry
            .payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
        {
            Ok(payload) => payload,
            Err(_) => {
                self.drop_entry(pool, entry, "unparseable payload").await?;
                summary.dropped += 1;
                return Ok(());
            }
        };

        summary.attempted += 1;

        match push_one(
            remote,
            entry.operation_enum(),
            entity_type,
            &entry.entity_id,
            payload.as_ref(),
        )
        .await
        {
            Ok(()) => {
                sync_queue::remove_from_queue(pool, entry.id).await?;
                summary.pushed += 1;
            }
            Err(e) => {
                let message = e.to_string();
                summary
                    .errors
                    .push(format!("{} {}: {}", entry.operation, entry.entity_id, message));

                let retry_count =
                    sync_queue::record_failed_attempt(pool, entry.id, &message).await?;

                if retry_count >= QueuedOperation::MAX_RETRIES {
                    self.drop_entry(
                        pool,
                        entry,
                        &format!("gave up after {} attempts: {}", retry_count, message),
                    )
                    .await?;
                    summary.dropped += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }

        Ok(())
    }

    /// Remove an entry terminally and record the drop.
    async fn drop_entry(
        &self,
        pool: &DbPool,
        entry: &QueuedOperation,
        reason: &str,
    ) -> Result<(), AppError> {
        log::warn!(
            "Dropping queued {} for {} '{}': {}",
            entry.operation,
            entry.entity_type,
            entry.entity_id,
            reason
        );

        sync_queue::remove_from_queue(pool, entry.id).await?;
        sync_log::record(
            pool,
            "push",
            LogStatus::Dropped,
            Some(&entry.entity_type),
            Some(&entry.entity_id),
            Some(reason.to_string()),
            None,
        )
        .await
    }
}
