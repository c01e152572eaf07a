//! RefDesk sync core - offline-first synchronization for a local-first
//! research tracker.
//!
//! Entity data and a durable operation queue live in local SQLite; queued
//! mutations drain to the remote service when the device is online and a
//! cloud session is active. The embedding application wires the pieces:
//!
//! ```no_run
//! use std::sync::Arc;
//! use refdesk_core::db;
//! use refdesk_core::models::{EntityType, Operation};
//! use refdesk_core::services::sync_engine::{SyncConfig, SyncEngine};
//! use refdesk_core::services::{sync_queue, NetworkMonitor};
//!
//! # async fn wire() -> Result<(), refdesk_core::error::AppError> {
//! let pool = db::initialize(&db::get_db_path(std::path::Path::new("/data"))).await?;
//! let monitor = Arc::new(NetworkMonitor::new(true));
//! let handle = SyncEngine::start_background(pool.clone(), monitor, SyncConfig::default());
//!
//! // Repository layer: persist locally, then nudge the engine.
//! let payload = serde_json::json!({"title": "Write intro"});
//! sync_queue::enqueue_mutation(&pool, Operation::Create, EntityType::Task, "t-1", Some(&payload)).await?;
//! handle.notify_local_change();
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod services;
