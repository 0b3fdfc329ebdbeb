//! Fault injection for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::memory::InMemoryStore;
use crate::traits::PersistentStore;

/// Wraps an [`InMemoryStore`] and fails writes on demand.
///
/// Reads always succeed so tests can inspect what was (not) persisted.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    /// Puts whose key starts with this prefix fail.
    fail_put_prefix: RwLock<Option<String>>,
    /// Yield to the scheduler before every write.
    yield_writes: AtomicBool,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Fails only the puts whose key starts with `prefix`; `None` clears it.
    pub fn fail_puts_with_prefix(&self, prefix: Option<&str>) {
        if let Ok(mut slot) = self.fail_put_prefix.write() {
            *slot = prefix.map(str::to_string);
        }
    }

    /// Makes every write yield once before it lands, so concurrent callers
    /// interleave at each store call.
    pub fn yield_on_writes(&self, enabled: bool) {
        self.yield_writes.store(enabled, Ordering::SeqCst);
    }

    fn put_blocked(&self, key: &str) -> bool {
        self.fail_puts.load(Ordering::SeqCst)
            || self
                .fail_put_prefix
                .read()
                .ok()
                .and_then(|prefix| prefix.as_ref().map(|p| key.starts_with(p.as_str())))
                .unwrap_or(false)
    }

    async fn maybe_yield(&self) {
        if self.yield_writes.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    /// Number of successful `put` calls.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of successful `delete` / `delete_many` calls.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistentStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.maybe_yield().await;
        if self.put_blocked(key) {
            return Err(StorageError::connection(format!("injected put failure for {key}")));
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.maybe_yield().await;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::connection(format!(
                "injected delete failure for {key}"
            )));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        self.maybe_yield().await;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::connection("injected bulk delete failure"));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_many(keys).await
    }

    async fn bulk_load(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        self.inner.bulk_load(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failures() {
        let store = FlakyStore::new();
        store.put("k", "v".into()).await.unwrap();
        assert_eq!(store.put_count(), 1);

        store.fail_puts(true);
        assert!(store.put("k", "w".into()).await.is_err());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.fail_deletes(true);
        assert!(store.delete_many(&["k".to_string()]).await.is_err());
        assert_eq!(store.delete_count(), 0);
        assert!(store.inner().contains_key("k"));
    }

    #[tokio::test]
    async fn test_prefix_put_failure() {
        let store = FlakyStore::new();
        store.fail_puts_with_prefix(Some("token/"));
        store.yield_on_writes(true);

        assert!(store.put("token/abc", "v".into()).await.is_err());
        store.put("login/student/1", "v".into()).await.unwrap();
        assert_eq!(store.put_count(), 1);

        store.fail_puts_with_prefix(None);
        store.put("token/abc", "v".into()).await.unwrap();
        assert!(store.inner().contains_key("token/abc"));
    }
}
