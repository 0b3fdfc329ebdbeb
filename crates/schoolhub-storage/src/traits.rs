//! The persistent store contract consumed by the caches and access control.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;

/// Type alias for a shareable store instance.
pub type DynStore = Arc<dyn PersistentStore>;

/// A durable key-value store.
///
/// Values are opaque strings (serialized JSON records). Implementations must
/// be thread-safe (`Send + Sync`); calls are awaited synchronously by the
/// caller and carry no timeout or cancellation of their own.
///
/// # Example
///
/// ```ignore
/// use schoolhub_storage::{PersistentStore, StorageError};
///
/// async fn read_flag(store: &dyn PersistentStore) -> Result<bool, StorageError> {
///     Ok(store
///         .get("settings/allow_default_password")
///         .await?
///         .is_some_and(|v| v == "true"))
/// }
/// ```
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Reads a value by key.
    ///
    /// Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing keys.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value, replacing any previous one.
    async fn put(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Deletes several keys in one call.
    ///
    /// Backends with a native bulk delete should override this; the default
    /// stops at the first failure.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Loads every `(key, value)` pair whose key starts with `prefix`,
    /// ordered by key.
    async fn bulk_load(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
