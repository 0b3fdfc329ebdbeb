//! In-memory store backend.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StorageError;
use crate::traits::PersistentStore;

/// In-memory key-value store using `DashMap` for concurrent access.
///
/// Nothing survives the process; it stands in for the relational store in
/// tests and when `storage.backend = "memory"`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: DashMap<String, String>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given pairs.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (k, v) in entries {
            store.data.insert(k.into(), v.into());
        }
        store
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns every key starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.data.remove(key);
        }
        Ok(())
    }

    async fn bulk_load(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        let mut entries: Vec<(String, String)> = self
            .data
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = InMemoryStore::new();
        store.put("teacher/t1", "{}".to_string()).await.unwrap();
        assert_eq!(store.get("teacher/t1").await.unwrap().as_deref(), Some("{}"));

        store.delete("teacher/t1").await.unwrap();
        assert!(store.get("teacher/t1").await.unwrap().is_none());

        // Deleting an absent key is fine.
        store.delete("teacher/t1").await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_load_is_prefix_scoped_and_sorted() {
        let store = InMemoryStore::with_entries([
            ("student/b", "2"),
            ("student/a", "1"),
            ("teacher/a", "x"),
        ]);

        let loaded = store.bulk_load("student/").await.unwrap();
        assert_eq!(
            loaded,
            vec![
                ("student/a".to_string(), "1".to_string()),
                ("student/b".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_many() {
        let store = InMemoryStore::with_entries([("a/1", "1"), ("a/2", "2"), ("a/3", "3")]);
        store
            .delete_many(&["a/1".to_string(), "a/3".to_string()])
            .await
            .unwrap();
        assert_eq!(store.keys_with_prefix("a/"), vec!["a/2".to_string()]);
    }
}
