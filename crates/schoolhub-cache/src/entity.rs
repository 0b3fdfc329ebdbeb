//! Entity traits and the persisted record wrapper.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Soft-delete status of a cached record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Valid,
    Deleted,
}

/// An entity that can live in an [`IndexedEntityCache`].
///
/// `id()` is the immutable identity key. `unique_keys()` lists the values of
/// every secondary unique index the entity participates in; an optional key
/// that is absent is simply omitted.
///
/// [`IndexedEntityCache`]: crate::IndexedEntityCache
pub trait CachedEntity:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Store namespace, also used in log fields and error messages.
    const NAMESPACE: &'static str;

    /// Names of the secondary unique indexes.
    const UNIQUE_INDEXES: &'static [&'static str];

    fn id(&self) -> &str;

    fn unique_keys(&self) -> Vec<(&'static str, String)>;
}

/// A partial update.
///
/// Implementations use explicit presence (`Option<T>`, or `Option<Option<T>>`
/// for nullable fields): an absent field keeps the current value, a present
/// one replaces it even when it is a zero value.
pub trait EntityPatch<E>: Send + Sync {
    fn apply_to(&self, current: &E) -> E;

    /// True when the patch carries no fields at all.
    fn is_empty(&self) -> bool {
        false
    }
}

/// The unit the cache stores and persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord<E> {
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(flatten)]
    pub value: E,
}

impl<E> EntityRecord<E> {
    pub fn valid(value: E) -> Self {
        Self {
            status: EntityStatus::Valid,
            value,
        }
    }

    pub fn deleted(value: E) -> Self {
        Self {
            status: EntityStatus::Deleted,
            value,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == EntityStatus::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Room {
        id: String,
        label: String,
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = EntityRecord::valid(Room {
            id: "r1".into(),
            label: "Lab".into(),
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "valid", "id": "r1", "label": "Lab"})
        );
    }

    #[test]
    fn test_missing_status_defaults_to_valid() {
        let record: EntityRecord<Room> =
            serde_json::from_str(r#"{"id": "r1", "label": "Lab"}"#).unwrap();
        assert!(record.is_valid());

        let record: EntityRecord<Room> =
            serde_json::from_str(r#"{"status": "deleted", "id": "r1", "label": "Lab"}"#).unwrap();
        assert_eq!(record.status, EntityStatus::Deleted);
    }
}
