//! Queued operation and sync log models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::entity::EntityType;

/// Kind of local mutation awaiting remote delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl From<&str> for Operation {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::Update, // Default fallback
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One durable queue entry: a local mutation pending synchronization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueuedOperation {
    /// Queue ID; assignment order is drain order.
    pub id: i64,

    /// Operation kind: `create`, `update`, `delete`.
    pub operation: String,

    /// Entity type discriminator.
    pub entity_type: String,

    /// Target entity ID.
    pub entity_id: String,

    /// Opaque JSON payload; absent for deletes.
    pub payload: Option<String>,

    /// Number of failed push attempts so far.
    pub retry_count: i64,

    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,

    /// When the mutation was enqueued locally (Unix seconds).
    pub created_at: i64,
}

impl QueuedOperation {
    /// Maximum failed push attempts before an entry is dropped.
    pub const MAX_RETRIES: i64 = 3;

    /// Parse the operation string into an enum.
    pub fn operation_enum(&self) -> Operation {
        Operation::from(self.operation.as_str())
    }

    /// Parse the entity type string into the enum.
    pub fn entity_type_enum(&self) -> Option<EntityType> {
        EntityType::parse(&self.entity_type)
    }

    /// Whether the next failed attempt will cross the retry cap.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= Self::MAX_RETRIES
    }
}

/// Status of a sync log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
    /// A queue entry was removed after exhausting its retries.
    Dropped,
}

impl From<&str> for LogStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "success" => Self::Success,
            "dropped" => Self::Dropped,
            _ => Self::Error,
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Dropped => write!(f, "dropped"),
        }
    }
}

/// Log of recent sync operations.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncLog {
    /// Log entry ID.
    pub id: i64,

    /// Operation type: `drain`, `pull`, `push`, `drop`, etc.
    pub operation: String,

    /// Status: `success`, `error`, `dropped`.
    pub status: String,

    /// Related entity type (optional).
    pub entity_type: Option<String>,

    /// Related entity ID (optional).
    pub entity_id: Option<String>,

    /// Details or error message.
    pub message: Option<String>,

    /// Operation duration in milliseconds.
    pub duration_ms: Option<i64>,

    /// When the operation occurred (Unix seconds).
    pub timestamp: i64,
}

impl SyncLog {
    /// Maximum number of log entries to keep.
    pub const MAX_ENTRIES: i64 = 50;

    /// Parse the status string into an enum.
    pub fn status_enum(&self) -> LogStatus {
        LogStatus::from(self.status.as_str())
    }

    /// Check if this log entry represents an error.
    pub fn is_error(&self) -> bool {
        self.status_enum() == LogStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_str() {
        assert_eq!(Operation::from("create"), Operation::Create);
        assert_eq!(Operation::from("UPDATE"), Operation::Update);
        assert_eq!(Operation::from("delete"), Operation::Delete);
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Create.to_string(), "create");
        assert_eq!(Operation::Update.to_string(), "update");
        assert_eq!(Operation::Delete.to_string(), "delete");
    }

    #[test]
    fn test_retries_exhausted() {
        let mut op = QueuedOperation {
            id: 1,
            operation: "update".to_string(),
            entity_type: "paper".to_string(),
            entity_id: "42".to_string(),
            payload: Some("{}".to_string()),
            retry_count: 0,
            last_error: None,
            created_at: 0,
        };

        assert!(!op.retries_exhausted());

        op.retry_count = QueuedOperation::MAX_RETRIES - 1;
        assert!(!op.retries_exhausted());

        op.retry_count = QueuedOperation::MAX_RETRIES;
        assert!(op.retries_exhausted());
    }

    #[test]
    fn test_log_status_from_str() {
        assert_eq!(LogStatus::from("success"), LogStatus::Success);
        assert_eq!(LogStatus::from("DROPPED"), LogStatus::Dropped);
        assert_eq!(LogStatus::from("anything-else"), LogStatus::Error);
    }
}
