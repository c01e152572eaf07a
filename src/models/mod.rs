//! Data models for the sync core.
//!
//! These models represent the rows of the local SQLite store: cached
//! entity snapshots, queued operations, and the sync log.
//!
//! All models derive Serialize for the embedding UI layer and FromRow for
//! SQLx database queries.

pub mod entity;
pub mod sync_op;

// Re-exports for convenient access
pub use entity::{EntityRecord, EntityType, NewEntity};
pub use sync_op::{LogStatus, Operation, QueuedOperation, SyncLog};
