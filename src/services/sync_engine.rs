//! Sync engine: orchestration on top of the queue processor.
//!
//! This module provides the higher-level sync operations:
//! - Delta pull: apply remote change descriptors since a checkpoint
//! - Initial bulk upload: seed a fresh cloud account from local data
//! - Full replace: overwrite local collections from a remote export
//! - A background task running pull-then-drain on an interval, with an
//!   mpsc command channel for immediate triggers

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{EntityType, LogStatus, NewEntity, Operation};
use crate::services::entity_store;
use crate::services::network_monitor::NetworkMonitor;
use crate::services::remote_client::{ChangeAction, RemoteApi, RemoteClient};
use crate::services::session;
use crate::services::sync_log;
use crate::services::sync_processor::{self, DrainOutcome, QueueProcessor};
use crate::services::sync_queue;
use crate::services::sync_trigger::DebouncedTrigger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, RwLock};
use tokio::time;

/// Default sync interval in seconds (5 minutes).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Get the current Unix timestamp.
fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Periodic sync interval in seconds.
    pub interval_secs: u64,

    /// Delay before the first background cycle, so the app surface is up
    /// before network I/O starts.
    pub startup_delay_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            startup_delay_secs: 3,
        }
    }
}

/// Status of the sync engine, for display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// Whether a sync cycle is currently running.
    pub is_syncing: bool,

    /// Last completed cycle timestamp.
    pub last_sync_time: Option<i64>,

    /// Last cycle error message.
    pub last_error: Option<String>,

    /// Count of queued operations awaiting push.
    pub queue_depth: i64,

    /// Number of remote changes applied by the last pull.
    pub last_pull_applied: i64,
}

/// Result of one delta pull.
#[derive(Debug, Default)]
pub struct PullSummary {
    /// Descriptors returned by the delta feed.
    pub changes: i64,

    /// Entities fetched and upserted locally.
    pub applied: i64,

    /// Local snapshots deleted.
    pub deleted: i64,

    /// Descriptors skipped (unknown type, vanished entity).
    pub skipped: i64,

    /// Per-descriptor error messages.
    pub errors: Vec<String>,
}

/// Result of an initial bulk upload.
#[derive(Debug, Default)]
pub struct BulkUploadSummary {
    /// Entities pushed with create semantics.
    pub uploaded: i64,

    /// Entities that failed to push and were skipped.
    pub failed: i64,
}

/// Result of a full-replace sync.
#[derive(Debug, Default)]
pub struct FullReplaceSummary {
    /// Collections overwritten from the export.
    pub collections_replaced: i64,

    /// Entities imported across all collections.
    pub imported: i64,
}

/// Commands that can be sent to the background sync engine.
#[derive(Debug)]
pub enum SyncCommand {
    /// Drain the operation queue now.
    TriggerDrain,

    /// Pull remote changes since the checkpoint now.
    TriggerPull,

    /// Replace local collections from a full remote export.
    FullReplace,

    /// Seed the remote side from the local dataset (once per login).
    InitialUpload,

    /// Update the sync configuration.
    UpdateConfig(SyncConfig),

    /// Stop the sync engine.
    Stop,
}

/// Lightweight handle for controlling the background sync engine.
///
/// Communicates with the background task via an mpsc channel, avoiding
/// lock contention; cheap to clone.
#[derive(Clone)]
pub struct SyncHandle {
    /// Command channel sender.
    command_tx: mpsc::Sender<SyncCommand>,

    /// Shared configuration (readable without locking the engine).
    config: Arc<RwLock<SyncConfig>>,

    /// Shared status snapshot.
    status: Arc<RwLock<SyncStatus>>,

    /// Debounced trigger fed by local mutations.
    trigger: Arc<DebouncedTrigger>,
}

impl SyncHandle {
    /// Signal that a local mutation happened; a drain follows the quiet
    /// period. Call this after every `enqueue_mutation`.
    pub fn notify_local_change(&self) {
        self.trigger.schedule();
    }

    /// Drain the queue now, bypassing the debounce.
    pub async fn trigger_drain(&self) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::TriggerDrain)
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Pull remote changes now.
    pub async fn trigger_pull(&self) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::TriggerPull)
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Run the full-replace recovery sync.
    pub async fn trigger_full_replace(&self) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::FullReplace)
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Seed the remote side from the local dataset.
    pub async fn trigger_initial_upload(&self) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::InitialUpload)
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Update the sync configuration.
    pub async fn update_config(&self, config: SyncConfig) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::UpdateConfig(config))
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Stop the background engine.
    pub async fn stop(&self) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::Stop)
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Get the current configuration.
    pub async fn get_config(&self) -> SyncConfig {
        self.config.read().await.clone()
    }

    /// Get the current status snapshot.
    pub async fn get_status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }
}

/// Sync orchestrator.
///
/// Owns the queue processor and implements pull, bulk upload, and
/// full-replace against any `RemoteApi` implementation.
pub struct SyncEngine {
    /// Database connection pool.
    pool: DbPool,

    /// Reachability mirror.
    monitor: Arc<NetworkMonitor>,

    /// Drain processor with the is-draining guard.
    processor: Arc<QueueProcessor>,

    /// Current configuration.
    config: Arc<RwLock<SyncConfig>>,

    /// Status snapshot.
    status: Arc<RwLock<SyncStatus>>,
}

impl SyncEngine {
    /// Create a new engine.
    pub fn new(pool: DbPool, monitor: Arc<NetworkMonitor>) -> Self {
        Self {
            pool,
            monitor,
            processor: Arc::new(QueueProcessor::new()),
            config: Arc::new(RwLock::new(SyncConfig::default())),
            status: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    /// Access the drain processor.
    pub fn processor(&self) -> &QueueProcessor {
        &self.processor
    }

    /// Drain the queue against the given remote (or note local-only mode).
    pub async fn drain(&self, remote: Option<&dyn RemoteApi>) -> Result<DrainOutcome, AppError> {
        self.processor.drain(&self.pool, &self.monitor, remote).await
    }

    /// Apply the remote delta feed since a checkpoint.
    ///
    /// Create/update descriptors fetch the full entity and upsert it;
    /// delete descriptors remove the local snapshot. The checkpoint
    /// advances after the feed is processed. Failure to reach the feed at
    /// all propagates to the caller; per-descriptor fetch failures are
    /// logged and skipped (the entity may have vanished between the delta
    /// and the fetch).
    pub async fn pull_since(
        &self,
        remote: &dyn RemoteApi,
        since: i64,
    ) -> Result<PullSummary, AppError> {
        let start = Instant::now();
        let changes = remote.changes_since(since).await?;

        let mut summary = PullSummary {
            changes: changes.len() as i64,
            ..Default::default()
        };

        for descriptor in &changes {
            let Some(entity_type) = EntityType::parse(&descriptor.entity_type) else {
                log::warn!(
                    "Skipping change for unknown entity type '{}'",
                    descriptor.entity_type
                );
                summary.skipped += 1;
                continue;
            };

            match descriptor.action {
                ChangeAction::Create | ChangeAction::Update => {
                    match remote.fetch_entity(entity_type, &descriptor.entity_id).await {
                        Ok(entity) => {
                            entity_store::save_entity(
                                &self.pool,
                                entity_type,
                                &entity.id,
                                &entity.payload,
                            )
                            .await?;
                            summary.applied += 1;
                        }
                        Err(e) => {
                            log::warn!(
                                "Failed to fetch {} '{}' during pull: {}",
                                entity_type,
                                descriptor.entity_id,
                                e
                            );
                            summary
                                .errors
                                .push(format!("{} {}: {}", entity_type, descriptor.entity_id, e));
                            summary.skipped += 1;
                        }
                    }
                }
                ChangeAction::Delete => {
                    entity_store::delete_entity(&self.pool, entity_type, &descriptor.entity_id)
                        .await?;
                    summary.deleted += 1;
                }
            }
        }

        entity_store::set_last_sync_at(&self.pool, now()).await?;

        let status = if summary.errors.is_empty() {
            LogStatus::Success
        } else {
            LogStatus::Error
        };
        sync_log::record(
            &self.pool,
            "pull",
            status,
            None,
            None,
            Some(format!(
                "{} changes, {} applied, {} deleted, {} skipped",
                summary.changes, summary.applied, summary.deleted, summary.skipped
            )),
            Some(start.elapsed().as_millis() as i64),
        )
        .await?;

        self.status.write().await.last_pull_applied = summary.applied;

        Ok(summary)
    }

    /// Push every locally-cached entity with create semantics.
    ///
    /// Used once per login to seed a fresh cloud account from a
    /// pre-existing local-only dataset. Per-item failures are logged and
    /// skipped; one failure never aborts the remaining uploads.
    pub async fn initial_bulk_upload(
        &self,
        remote: &dyn RemoteApi,
    ) -> Result<BulkUploadSummary, AppError> {
        let start = Instant::now();
        let mut summary = BulkUploadSummary::default();

        for entity_type in EntityType::ALL {
            let records = entity_store::get_all_entities(&self.pool, entity_type).await?;

            for record in records {
                let payload = match record.payload_json() {
                    Ok(payload) => payload,
                    Err(e) => {
                        log::warn!(
                            "Skipping {} '{}' with unparseable payload: {}",
                            entity_type,
                            record.id,
                            e
                        );
                        summary.failed += 1;
                        continue;
                    }
                };

                match sync_processor::push_one(
                    remote,
                    Operation::Create,
                    entity_type,
                    &record.id,
                    Some(&payload),
                )
                .await
                {
                    Ok(()) => summary.uploaded += 1,
                    Err(e) => {
                        log::warn!(
                            "Failed to upload {} '{}': {}",
                            entity_type,
                            record.id,
                            e
                        );
                        sync_log::record(
                            &self.pool,
                            "initial_upload",
                            LogStatus::Error,
                            Some(entity_type.as_str()),
                            Some(&record.id),
                            Some(e.to_string()),
                            None,
                        )
                        .await?;
                        summary.failed += 1;
                    }
                }
            }
        }

        sync_log::record(
            &self.pool,
            "initial_upload",
            LogStatus::Success,
            None,
            None,
            Some(format!(
                "uploaded {}, failed {}",
                summary.uploaded, summary.failed
            )),
            Some(start.elapsed().as_millis() as i64),
        )
        .await?;

        Ok(summary)
    }

    /// Replace local collections wholesale from a full remote export.
    ///
    /// This is the "trust the server" recovery path: each collection
    /// present in the export is cleared and rewritten, so local-only
    /// records of those types do not survive. Collections absent from the
    /// export are left untouched.
    pub async fn full_replace(
        &self,
        remote: &dyn RemoteApi,
    ) -> Result<FullReplaceSummary, AppError> {
        let start = Instant::now();
        let export = remote.full_export().await?;

        let mut summary = FullReplaceSummary::default();

        for entity_type in EntityType::ALL {
            let Some(remote_entities) = export.collections.get(entity_type.collection()) else {
                continue;
            };

            entity_store::clear_entities(&self.pool, entity_type).await?;

            let records: Vec<NewEntity> = remote_entities
                .iter()
                .map(|e| NewEntity {
                    id: e.id.clone(),
                    payload: e.payload.clone(),
                })
                .collect();

            let written = entity_store::save_entities(&self.pool, entity_type, &records).await?;
            summary.collections_replaced += 1;
            summary.imported += written as i64;
        }

        // Prefer the export's own timestamp as the new checkpoint
        let checkpoint = export
            .exported_at
            .as_deref()
            .map(parse_iso_timestamp)
            .filter(|ts| *ts > 0)
            .unwrap_or_else(now);
        entity_store::set_last_sync_at(&self.pool, checkpoint).await?;

        sync_log::record(
            &self.pool,
            "full_replace",
            LogStatus::Success,
            None,
            None,
            Some(format!(
                "{} collections, {} entities",
                summary.collections_replaced, summary.imported
            )),
            Some(start.elapsed().as_millis() as i64),
        )
        .await?;

        Ok(summary)
    }

    /// One periodic cycle: pull the delta, then drain the queue.
    pub async fn run_cycle(&self) -> Result<(), AppError> {
        let Some(client) = self.resolve_remote().await? else {
            log::debug!("No cloud session; skipping sync cycle");
            return Ok(());
        };

        self.status.write().await.is_syncing = true;

        let mut errors: Vec<String> = Vec::new();

        let since = entity_store::get_last_sync_at(&self.pool).await?;
        match self.pull_since(&client, since).await {
            Ok(summary) => errors.extend(summary.errors),
            Err(e) => errors.push(format!("pull: {}", e)),
        }

        match self.drain(Some(&client)).await {
            Ok(DrainOutcome::Completed(summary)) => errors.extend(summary.errors),
            Ok(_) => {}
            Err(e) => errors.push(format!("drain: {}", e)),
        }

        let queue_depth = sync_queue::queue_depth(&self.pool).await.unwrap_or(0);

        let mut status = self.status.write().await;
        status.is_syncing = false;
        status.last_sync_time = Some(now());
        status.queue_depth = queue_depth;
        status.last_error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };

        Ok(())
    }

    /// Build a remote client for the current session, if cloud mode is on.
    async fn resolve_remote(&self) -> Result<Option<RemoteClient>, AppError> {
        let Some(config) = session::cloud_credentials(&self.pool).await? else {
            return Ok(None);
        };

        Ok(Some(RemoteClient::new(config)?))
    }

    /// Drain against the current session, absorbing errors into the log.
    async fn drain_with_session(&self) {
        let remote = match self.resolve_remote().await {
            Ok(remote) => remote,
            Err(e) => {
                log::warn!("Failed to resolve cloud session: {}", e);
                return;
            }
        };

        let remote_ref = remote.as_ref().map(|c| c as &dyn RemoteApi);
        if let Err(e) = self.drain(remote_ref).await {
            log::warn!("Drain failed: {}", e);
        }

        if let Ok(depth) = sync_queue::queue_depth(&self.pool).await {
            self.status.write().await.queue_depth = depth;
        }
    }

    /// Start the background sync loop.
    ///
    /// Spawns a task that owns the engine: it runs pull-then-drain on the
    /// configured interval and serializes explicit commands from the
    /// returned handle. The network monitor's online edge and the
    /// debounced local-change trigger both feed drain requests into the
    /// same channel.
    pub fn start_background(
        pool: DbPool,
        monitor: Arc<NetworkMonitor>,
        config: SyncConfig,
    ) -> SyncHandle {
        let (tx, mut rx) = mpsc::channel::<SyncCommand>(16);
        let config_shared = Arc::new(RwLock::new(config));
        let status_shared = Arc::new(RwLock::new(SyncStatus::default()));

        // Reachability returning requests an immediate drain
        {
            let tx = tx.clone();
            monitor.on_online(move || {
                let _ = tx.try_send(SyncCommand::TriggerDrain);
            });
        }

        // Local edits coalesce through the debounced trigger
        let trigger = {
            let tx = tx.clone();
            Arc::new(DebouncedTrigger::start(move || {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(SyncCommand::TriggerDrain).await;
                }
            }))
        };

        let engine = SyncEngine {
            pool,
            monitor,
            processor: Arc::new(QueueProcessor::new()),
            config: config_shared.clone(),
            status: status_shared.clone(),
        };

        tokio::spawn(async move {
            let startup_delay = engine.config.read().await.startup_delay_secs;
            time::sleep(Duration::from_secs(startup_delay)).await;

            log::info!("Running initial sync cycle");
            if let Err(e) = engine.run_cycle().await {
                log::warn!("Initial sync cycle failed: {}", e);
            }

            let interval_secs = engine.config.read().await.interval_secs;
            let mut interval = time::interval(Duration::from_secs(interval_secs));
            // Consume the first (immediate) tick since we just ran a cycle
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = engine.run_cycle().await {
                            log::warn!("Periodic sync cycle failed: {}", e);
                        }
                    }
                    Some(cmd) = rx.recv() => {
                        match cmd {
                            SyncCommand::TriggerDrain => {
                                engine.drain_with_session().await;
                            }
                            SyncCommand::TriggerPull => {
                                match engine.resolve_remote().await {
                                    Ok(Some(client)) => {
                                        let since = entity_store::get_last_sync_at(&engine.pool)
                                            .await
                                            .unwrap_or(0);
                                        if let Err(e) = engine.pull_since(&client, since).await {
                                            log::warn!("Pull failed: {}", e);
                                        }
                                    }
                                    Ok(None) => log::debug!("No cloud session; pull skipped"),
                                    Err(e) => log::warn!("Failed to resolve cloud session: {}", e),
                                }
                            }
                            SyncCommand::FullReplace => {
                                match engine.resolve_remote().await {
                                    Ok(Some(client)) => {
                                        if let Err(e) = engine.full_replace(&client).await {
                                            log::warn!("Full replace failed: {}", e);
                                        }
                                    }
                                    Ok(None) => log::debug!("No cloud session; full replace skipped"),
                                    Err(e) => log::warn!("Failed to resolve cloud session: {}", e),
                                }
                            }
                            SyncCommand::InitialUpload => {
                                match engine.resolve_remote().await {
                                    Ok(Some(client)) => {
                                        if let Err(e) = engine.initial_bulk_upload(&client).await {
                                            log::warn!("Initial upload failed: {}", e);
                                        }
                                    }
                                    Ok(None) => log::debug!("No cloud session; upload skipped"),
                                    Err(e) => log::warn!("Failed to resolve cloud session: {}", e),
                                }
                            }
                            SyncCommand::UpdateConfig(new_config) => {
                                log::info!(
                                    "Sync config updated, interval={}s",
                                    new_config.interval_secs
                                );
                                interval =
                                    time::interval(Duration::from_secs(new_config.interval_secs));
                                interval.tick().await;
                                *engine.config.write().await = new_config;
                            }
                            SyncCommand::Stop => {
                                log::info!("Sync engine stopping");
                                break;
                            }
                        }
                    }
                }
            }
            log::info!("Sync engine stopped");
        });

        SyncHandle {
            command_tx: tx,
            config: config_shared,
            status: status_shared,
            trigger,
        }
    }
}

/// Parse an ISO 8601 timestamp to Unix seconds. Returns 0 on failure.
fn parse_iso_timestamp(s: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::services::remote_client::{ChangeDescriptor, RemoteEntity, RemoteExport};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    async fn setup_engine() -> SyncEngine {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        std::mem::forget(dir);

        let pool = db::initialize(&db_path).await.unwrap();
        SyncEngine::new(pool, Arc::new(NetworkMonitor::new(true)))
    }

    fn pool(engine: &SyncEngine) -> &DbPool {
        &engine.pool
    }

    /// Mock remote serving canned changes, entities, and exports.
    #[derive(Default)]
    struct MockRemote {
        changes: Vec<ChangeDescriptor>,
        entities: HashMap<String, RemoteEntity>,
        export: Option<RemoteExport>,
        pushed: Mutex<Vec<String>>,
        fail_create_for: Option<String>,
    }

    #[async_trait]
    impl RemoteApi for MockRemote {
        async fn create_entity(
            &self,
            entity_type: EntityType,
            id: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), AppError> {
            if self.fail_create_for.as_deref() == Some(id) {
                return Err(AppError::remote_api("boom"));
            }
            self.pushed
                .lock()
                .unwrap()
                .push(format!("{}/{}", entity_type.collection(), id));
            Ok(())
        }

        async fn update_entity(
            &self,
            _entity_type: EntityType,
            _id: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), AppError> {
            Ok(())
        }

        async fn delete_entity(
            &self,
            _entity_type: EntityType,
            _id: &str,
        ) -> Result<(), AppError> {
            Ok(())
        }

        async fn fetch_entity(
            &self,
            _entity_type: EntityType,
            id: &str,
        ) -> Result<RemoteEntity, AppError> {
            self.entities
                .get(id)
                .cloned()
                .ok_or_else(|| AppError::not_found_with_id("entity", id))
        }

        async fn changes_since(&self, _since: i64) -> Result<Vec<ChangeDescriptor>, AppError> {
            Ok(self.changes.clone())
        }

        async fn full_export(&self) -> Result<RemoteExport, AppError> {
            self.export
                .clone()
                .ok_or_else(|| AppError::remote_api("export unavailable"))
        }
    }

    fn descriptor(entity_type: &str, entity_id: &str, action: ChangeAction) -> ChangeDescriptor {
        ChangeDescriptor {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action,
            synced_at: None,
        }
    }

    #[tokio::test]
    async fn test_pull_applies_creates_and_deletes() {
        let engine = setup_engine().await;

        // Entity 7 exists locally and the feed says it was deleted remotely
        entity_store::save_entity(pool(&engine), EntityType::Task, "7", &json!({"title": "x"}))
            .await
            .unwrap();

        let mut remote = MockRemote::default();
        remote.changes = vec![
            descriptor("paper", "42", ChangeAction::Create),
            descriptor("task", "7", ChangeAction::Delete),
        ];
        remote.entities.insert(
            "42".to_string(),
            RemoteEntity {
                id: "42".to_string(),
                payload: json!({"title": "Attention Is All You Need"}),
                updated_at: Some("2026-08-01T10:00:00Z".to_string()),
            },
        );

        let summary = engine.pull_since(&remote, 0).await.unwrap();
        assert_eq!(summary.changes, 2);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.deleted, 1);

        let paper = entity_store::get_entity(pool(&engine), EntityType::Paper, "42")
            .await
            .unwrap();
        assert!(paper.is_some());

        let task = entity_store::get_entity(pool(&engine), EntityType::Task, "7")
            .await
            .unwrap();
        assert!(task.is_none());

        // Checkpoint advanced
        assert!(entity_store::get_last_sync_at(pool(&engine)).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_pull_skips_unknown_types_and_missing_entities() {
        let engine = setup_engine().await;

        let mut remote = MockRemote::default();
        remote.changes = vec![
            descriptor("bookmark", "1", ChangeAction::Create),
            descriptor("paper", "gone", ChangeAction::Update),
        ];

        let summary = engine.pull_since(&remote, 0).await.unwrap();
        assert_eq!(summary.applied, 0);
        assert_eq!(summary.skipped, 2);
        // One error for the vanished entity; unknown types skip silently
        assert_eq!(summary.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_initial_bulk_upload_pushes_all_types() {
        let engine = setup_engine().await;

        entity_store::save_entity(pool(&engine), EntityType::Paper, "p1", &json!({"t": 1}))
            .await
            .unwrap();
        entity_store::save_entity(pool(&engine), EntityType::Task, "t1", &json!({"t": 2}))
            .await
            .unwrap();
        entity_store::save_entity(pool(&engine), EntityType::Reminder, "r1", &json!({"t": 3}))
            .await
            .unwrap();

        let remote = MockRemote::default();
        let summary = engine.initial_bulk_upload(&remote).await.unwrap();

        assert_eq!(summary.uploaded, 3);
        assert_eq!(summary.failed, 0);

        let pushed = remote.pushed.lock().unwrap().clone();
        assert!(pushed.contains(&"papers/p1".to_string()));
        assert!(pushed.contains(&"tasks/t1".to_string()));
        assert!(pushed.contains(&"reminders/r1".to_string()));
    }

    #[tokio::test]
    async fn test_initial_bulk_upload_skips_failures() {
        let engine = setup_engine().await;

        entity_store::save_entity(pool(&engine), EntityType::Paper, "good", &json!({}))
            .await
            .unwrap();
        entity_store::save_entity(pool(&engine), EntityType::Paper, "bad", &json!({}))
            .await
            .unwrap();

        let remote = MockRemote {
            fail_create_for: Some("bad".to_string()),
            ..Default::default()
        };

        let summary = engine.initial_bulk_upload(&remote).await.unwrap();
        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_full_replace_overwrites_collections() {
        let engine = setup_engine().await;

        // Local-only paper that the export does not contain
        entity_store::save_entity(pool(&engine), EntityType::Paper, "local-only", &json!({}))
            .await
            .unwrap();
        // A task collection the export omits entirely
        entity_store::save_entity(pool(&engine), EntityType::Task, "kept", &json!({}))
            .await
            .unwrap();

        let mut collections = HashMap::new();
        collections.insert(
            "papers".to_string(),
            vec![
                RemoteEntity { id: "1".to_string(), payload: json!({"n": 1}), updated_at: None },
                RemoteEntity { id: "2".to_string(), payload: json!({"n": 2}), updated_at: None },
                RemoteEntity { id: "3".to_string(), payload: json!({"n": 3}), updated_at: None },
            ],
        );

        let remote = MockRemote {
            export: Some(RemoteExport {
                collections,
                exported_at: Some("2026-08-02T12:00:00Z".to_string()),
            }),
            ..Default::default()
        };

        let summary = engine.full_replace(&remote).await.unwrap();
        assert_eq!(summary.collections_replaced, 1);
        assert_eq!(summary.imported, 3);

        // The paper collection is exactly the export: local-only is gone
        let papers = entity_store::get_all_entities(pool(&engine), EntityType::Paper)
            .await
            .unwrap();
        assert_eq!(papers.len(), 3);
        assert!(papers.iter().all(|p| p.id != "local-only"));

        // Collections absent from the export are untouched
        let tasks = entity_store::get_all_entities(pool(&engine), EntityType::Task)
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);

        // Checkpoint taken from the export timestamp
        let checkpoint = entity_store::get_last_sync_at(pool(&engine)).await.unwrap();
        assert_eq!(checkpoint, parse_iso_timestamp("2026-08-02T12:00:00Z"));
    }

    #[tokio::test]
    async fn test_full_replace_propagates_outer_failure() {
        let engine = setup_engine().await;
        let remote = MockRemote::default(); // no export configured

        let result = engine.full_replace(&remote).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.interval_secs, DEFAULT_SYNC_INTERVAL_SECS);
        assert_eq!(config.startup_delay_secs, 3);
    }

    #[test]
    fn test_parse_iso_timestamp() {
        let ts = parse_iso_timestamp("2026-01-15T10:30:00Z");
        assert!(ts > 0);

        let ts2 = parse_iso_timestamp("2026-01-15T10:30:00+00:00");
        assert_eq!(ts, ts2);

        // Invalid timestamp should return 0
        let ts_invalid = parse_iso_timestamp("invalid");
        assert_eq!(ts_invalid, 0);
    }

    #[test]
    fn test_sync_status_initial() {
        let status = SyncStatus::default();

        assert!(!status.is_syncing);
        assert!(status.last_sync_time.is_none());
        assert_eq!(status.queue_depth, 0);
    }
}
