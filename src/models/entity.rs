//! Entity snapshot model and the closed entity-type enumeration.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The closed set of entity types the tracker synchronizes.
///
/// The sync core only uses this as a routing key; payload internals stay
/// opaque and are mapped by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Paper,
    Task,
    Conference,
    Submission,
    Reminder,
}

impl EntityType {
    /// Every known entity type, in the order bulk operations visit them.
    pub const ALL: [EntityType; 5] = [
        Self::Paper,
        Self::Task,
        Self::Conference,
        Self::Submission,
        Self::Reminder,
    ];

    /// The string stored in the `entity_type` columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Task => "task",
            Self::Conference => "conference",
            Self::Submission => "submission",
            Self::Reminder => "reminder",
        }
    }

    /// The remote collection path segment for this type.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Paper => "papers",
            Self::Task => "tasks",
            Self::Conference => "conferences",
            Self::Submission => "submissions",
            Self::Reminder => "reminders",
        }
    }

    /// Parse a stored type string. Returns `None` for unknown strings so
    /// corrupt rows surface instead of being silently rerouted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "paper" => Some(Self::Paper),
            "task" => Some(Self::Task),
            "conference" => Some(Self::Conference),
            "submission" => Some(Self::Submission),
            "reminder" => Some(Self::Reminder),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached snapshot of one entity, replaced wholesale on every write.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityRecord {
    /// Entity type discriminator (`paper`, `task`, ...).
    pub entity_type: String,

    /// Entity ID, unique within its type.
    pub id: String,

    /// Opaque JSON payload.
    pub payload: String,

    /// When this snapshot was last written (Unix seconds).
    pub updated_at: i64,
}

/// Input for writing one entity snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    /// Entity ID, unique within its type.
    pub id: String,

    /// Opaque JSON payload.
    pub payload: serde_json::Value,
}

impl EntityRecord {
    /// Parse the stored type string into the enum.
    pub fn entity_type_enum(&self) -> Option<EntityType> {
        EntityType::parse(&self.entity_type)
    }

    /// Parse the payload as JSON.
    pub fn payload_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip() {
        for ty in EntityType::ALL {
            assert_eq!(EntityType::parse(ty.as_str()), Some(ty));
        }
    }

    #[test]
    fn test_entity_type_parse_is_case_insensitive() {
        assert_eq!(EntityType::parse("Paper"), Some(EntityType::Paper));
        assert_eq!(EntityType::parse("TASK"), Some(EntityType::Task));
    }

    #[test]
    fn test_entity_type_parse_rejects_unknown() {
        assert_eq!(EntityType::parse("bookmark"), None);
        assert_eq!(EntityType::parse(""), None);
    }

    #[test]
    fn test_collection_paths() {
        assert_eq!(EntityType::Paper.collection(), "papers");
        assert_eq!(EntityType::Conference.collection(), "conferences");
    }

    #[test]
    fn test_payload_json() {
        let record = EntityRecord {
            entity_type: "paper".to_string(),
            id: "42".to_string(),
            payload: r#"{"title": "Attention Is All You Need", "isFavorite": true}"#.to_string(),
            updated_at: 0,
        };

        let json = record.payload_json().unwrap();
        assert_eq!(json["isFavorite"], serde_json::json!(true));
        assert_eq!(record.entity_type_enum(), Some(EntityType::Paper));
    }
}
