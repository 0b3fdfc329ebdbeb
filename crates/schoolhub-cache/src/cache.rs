use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use schoolhub_core::{CoreError, Result};
use schoolhub_storage::{DynStore, StorageError};
use schoolhub_storage::keys::{entity_key, namespace_prefix};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::entity::{CachedEntity, EntityPatch, EntityRecord, EntityStatus};

/// Tombstone ratio at which a delete signals the compactor.
pub const DEFAULT_TOMBSTONE_RATIO: f64 = 0.75;

/// Name under which the id index appears in an [`IndexSnapshot`].
pub const PRIMARY_INDEX: &str = "id";

/// Sorted copy of every index: index name -> key -> slot.
pub type IndexSnapshot = BTreeMap<String, BTreeMap<String, usize>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheOptions {
    /// Deleted / total ratio at or above which compaction is signalled.
    pub tombstone_ratio: f64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            tombstone_ratio: DEFAULT_TOMBSTONE_RATIO,
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Length of the backing sequence, tombstones included.
    pub len: usize,
    /// Number of Valid records.
    pub live: usize,
    /// Tombstones since the last compaction.
    pub deleted: usize,
    /// Number of compactions run so far.
    pub compactions: u64,
}

impl CacheStats {
    pub fn tombstone_ratio(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.deleted as f64 / self.len as f64
        }
    }
}

/// Result of a bulk delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Ids that were found and removed.
    pub deleted: Vec<String>,
    /// Ids that were not present.
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionOutcome {
    /// Tombstoned slots dropped.
    pub reclaimed: usize,
    /// Records that survived.
    pub live: usize,
}

struct CacheState<E> {
    slots: Vec<EntityRecord<E>>,
    by_id: HashMap<String, usize>,
    indexes: HashMap<&'static str, HashMap<String, usize>>,
    deleted: usize,
    compactions: u64,
}

impl<E: CachedEntity> CacheState<E> {
    fn empty() -> Self {
        Self {
            slots: Vec::new(),
            by_id: HashMap::new(),
            indexes: E::UNIQUE_INDEXES
                .iter()
                .map(|name| (*name, HashMap::new()))
                .collect(),
            deleted: 0,
            compactions: 0,
        }
    }

    /// Rejects `entity` if its id or any unique key is held by a slot other
    /// than `owner`.
    fn check_unique(&self, entity: &E, owner: Option<usize>) -> Result<()> {
        let id_taken = self
            .by_id
            .get(entity.id())
            .is_some_and(|&slot| Some(slot) != owner);
        if id_taken {
            return Err(CoreError::already_exists(format!(
                "{} id '{}'",
                E::NAMESPACE,
                entity.id()
            )));
        }
        for (index, key) in entity.unique_keys() {
            let taken = self
                .indexes
                .get(index)
                .and_then(|map| map.get(&key))
                .is_some_and(|&slot| Some(slot) != owner);
            if taken {
                return Err(CoreError::already_exists(format!(
                    "{} {index} '{key}'",
                    E::NAMESPACE
                )));
            }
        }
        Ok(())
    }

    fn index_slot(&mut self, slot: usize) {
        let value = &self.slots[slot].value;
        self.by_id.insert(value.id().to_string(), slot);
        for (index, key) in value.unique_keys() {
            self.indexes.entry(index).or_default().insert(key, slot);
        }
    }

    fn unindex_slot(&mut self, slot: usize) {
        let value = &self.slots[slot].value;
        self.by_id.remove(value.id());
        for (index, key) in value.unique_keys() {
            if let Some(map) = self.indexes.get_mut(index) {
                if map.get(&key) == Some(&slot) {
                    map.remove(&key);
                }
            }
        }
    }

    fn push(&mut self, record: EntityRecord<E>) -> usize {
        let slot = self.slots.len();
        self.slots.push(record);
        self.index_slot(slot);
        slot
    }

    fn replace(&mut self, slot: usize, value: E) {
        self.unindex_slot(slot);
        self.slots[slot].value = value;
        self.index_slot(slot);
    }

    fn tombstone(&mut self, slot: usize) {
        self.unindex_slot(slot);
        self.slots[slot].status = EntityStatus::Deleted;
        self.deleted += 1;
    }

    /// Keeps Valid records in their relative order and rebuilds every index.
    fn rebuild(&mut self, records: Vec<EntityRecord<E>>) {
        self.slots = Vec::with_capacity(records.len());
        self.by_id.clear();
        for map in self.indexes.values_mut() {
            map.clear();
        }
        for record in records.into_iter().filter(EntityRecord::is_valid) {
            if let Err(e) = self.check_unique(&record.value, None) {
                warn!(
                    namespace = E::NAMESPACE,
                    id = record.value.id(),
                    error = %e,
                    "Skipping record that collides with an earlier one"
                );
                continue;
            }
            self.push(record);
        }
        self.deleted = 0;
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.slots.len(),
            live: self.slots.len() - self.deleted,
            deleted: self.deleted,
            compactions: self.compactions,
        }
    }

    fn get(&self, id: &str) -> Option<&E> {
        self.by_id.get(id).map(|&slot| &self.slots[slot].value)
    }

    fn live(&self) -> impl Iterator<Item = &E> {
        self.slots
            .iter()
            .filter(|record| record.is_valid())
            .map(|record| &record.value)
    }
}

/// A write-through cache of one entity type with unique secondary indexes.
///
/// A single async mutex covers the backing sequence and all indexes, and it
/// is held across the store call so the uniqueness check, the write and the
/// in-memory mutation are atomic with respect to other callers. Slot numbers
/// never leave this type.
pub struct IndexedEntityCache<E: CachedEntity> {
    store: DynStore,
    state: Mutex<CacheState<E>>,
    wake: Arc<Notify>,
    options: CacheOptions,
}

impl<E: CachedEntity> IndexedEntityCache<E> {
    /// Creates an empty cache with default options.
    pub fn new(store: DynStore) -> Self {
        Self::with_options(store, CacheOptions::default())
    }

    pub fn with_options(store: DynStore, options: CacheOptions) -> Self {
        Self {
            store,
            state: Mutex::new(CacheState::empty()),
            wake: Arc::new(Notify::new()),
            options,
        }
    }

    pub fn namespace(&self) -> &'static str {
        E::NAMESPACE
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    /// The signal raised when a delete crosses the tombstone threshold.
    ///
    /// `Notify` keeps at most one permit, so a burst of deletes results in a
    /// single pending wake-up.
    pub fn compaction_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Replaces the cache contents with the Valid entries of `records`.
    ///
    /// Returns the number of records loaded.
    pub async fn init(&self, records: Vec<EntityRecord<E>>) -> usize {
        let mut state = self.state.lock().await;
        state.rebuild(records);
        state.slots.len()
    }

    /// Bulk-loads this cache's namespace from the store.
    pub async fn load(&self) -> Result<usize> {
        let prefix = namespace_prefix(E::NAMESPACE);
        let entries = self.store.bulk_load(&prefix).await?;
        let mut records = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let record: EntityRecord<E> = serde_json::from_str(&value).map_err(|e| {
                StorageError::serialization(format!("record '{key}': {e}"))
            })?;
            records.push(record);
        }
        let total = records.len();
        let loaded = self.init(records).await;
        info!(
            namespace = E::NAMESPACE,
            backend = self.store.backend_name(),
            total,
            loaded,
            "Cache loaded"
        );
        Ok(loaded)
    }

    /// Adds a new entity.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the id or any unique key is taken
    /// - `Internal` if the store write fails; the cache is left unmodified
    pub async fn add(&self, entity: E) -> Result<E> {
        let mut state = self.state.lock().await;
        state.check_unique(&entity, None)?;

        let record = EntityRecord::valid(entity);
        let payload = serde_json::to_string(&record)?;
        self.store
            .put(&entity_key(E::NAMESPACE, record.value.id()), payload)
            .await?;

        let slot = state.push(record);
        debug!(
            namespace = E::NAMESPACE,
            id = state.slots[slot].value.id(),
            "Entity added"
        );
        Ok(state.slots[slot].value.clone())
    }

    /// Applies `patch` to the entity with `id` and returns the result.
    ///
    /// An unchanged merge succeeds without touching the store.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `id` is absent
    /// - `InvalidInput` if the patch tries to change the id
    /// - `AlreadyExists` if the merged entity collides on a unique key
    /// - `Internal` if the store write fails; the pre-patch value is kept
    pub async fn update<P>(&self, id: &str, patch: &P) -> Result<E>
    where
        P: EntityPatch<E> + ?Sized,
    {
        let mut state = self.state.lock().await;
        let slot = *state
            .by_id
            .get(id)
            .ok_or_else(|| CoreError::not_found(format!("{} '{id}'", E::NAMESPACE)))?;

        let current = &state.slots[slot].value;
        if patch.is_empty() {
            return Ok(current.clone());
        }
        let merged = patch.apply_to(current);
        if merged.id() != current.id() {
            return Err(CoreError::invalid_input(format!(
                "{} id is immutable",
                E::NAMESPACE
            )));
        }
        if merged == *current {
            debug!(namespace = E::NAMESPACE, id, "Update is a no-op");
            return Ok(merged);
        }
        state.check_unique(&merged, Some(slot))?;

        let payload = serde_json::to_string(&EntityRecord::valid(&merged))?;
        self.store
            .put(&entity_key(E::NAMESPACE, id), payload)
            .await?;

        state.replace(slot, merged.clone());
        debug!(namespace = E::NAMESPACE, id, "Entity updated");
        Ok(merged)
    }

    /// Soft-deletes every id in `ids` that is present.
    ///
    /// Found entries are tombstoned in memory first, then removed from the
    /// store with a single bulk delete. If that store call fails the
    /// in-memory removal stands and the error is returned; callers must
    /// treat it as a partial failure.
    pub async fn delete<S>(&self, ids: &[S]) -> Result<DeleteReport>
    where
        S: AsRef<str>,
    {
        let mut state = self.state.lock().await;
        let mut report = DeleteReport::default();
        let mut seen = HashSet::new();

        for id in ids {
            let id: &str = id.as_ref();
            if !seen.insert(id) {
                continue;
            }
            match state.by_id.get(id).copied() {
                Some(slot) => {
                    state.tombstone(slot);
                    report.deleted.push(id.to_string());
                }
                None => report.missing.push(id.to_string()),
            }
        }

        if report.deleted.is_empty() {
            return Ok(report);
        }

        let stats = state.stats();
        let keys: Vec<String> = report
            .deleted
            .iter()
            .map(|id| entity_key(E::NAMESPACE, id))
            .collect();
        let persisted = self.store.delete_many(&keys).await;

        if stats.tombstone_ratio() >= self.options.tombstone_ratio {
            debug!(
                namespace = E::NAMESPACE,
                deleted = stats.deleted,
                len = stats.len,
                "Tombstone threshold reached, signalling compaction"
            );
            self.wake.notify_one();
        }

        if let Err(e) = persisted {
            warn!(
                namespace = E::NAMESPACE,
                ids = ?report.deleted,
                error = %e,
                "Store delete failed after in-memory removal"
            );
            return Err(CoreError::internal(format!(
                "{} entries removed from cache but store delete failed: {e}",
                E::NAMESPACE
            )));
        }

        debug!(
            namespace = E::NAMESPACE,
            deleted = report.deleted.len(),
            missing = report.missing.len(),
            "Entities deleted"
        );
        Ok(report)
    }

    /// Returns a copy of the entity with `id`.
    pub async fn get(&self, id: &str) -> Option<E> {
        self.state.lock().await.get(id).cloned()
    }

    /// Looks up an entity through a secondary unique index.
    pub async fn get_by(&self, index: &str, key: &str) -> Option<E> {
        let state = self.state.lock().await;
        let slot = *state.indexes.get(index)?.get(key)?;
        Some(state.slots[slot].value.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.lock().await.by_id.contains_key(id)
    }

    /// Every live entity in insertion order.
    pub async fn get_all(&self) -> Vec<E> {
        self.state.lock().await.live().cloned().collect()
    }

    /// Live entities matching `pred`, in insertion order.
    pub async fn filter<F>(&self, pred: F) -> Vec<E>
    where
        F: Fn(&E) -> bool,
    {
        self.state
            .lock()
            .await
            .live()
            .filter(|e| pred(e))
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.state.lock().await.live().count()
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats()
    }

    /// Whether the current tombstone ratio is at or above the threshold.
    pub async fn needs_compaction(&self) -> bool {
        let stats = self.stats().await;
        stats.deleted > 0 && stats.tombstone_ratio() >= self.options.tombstone_ratio
    }

    /// Rebuilds the backing sequence without tombstones.
    ///
    /// Pure in-memory work; it cannot fail.
    pub async fn compact(&self) -> CompactionOutcome {
        let mut state = self.state.lock().await;
        let before = state.slots.len();
        let records = std::mem::take(&mut state.slots);
        state.rebuild(records);
        state.compactions += 1;

        let outcome = CompactionOutcome {
            reclaimed: before - state.slots.len(),
            live: state.slots.len(),
        };
        debug!(
            namespace = E::NAMESPACE,
            reclaimed = outcome.reclaimed,
            live = outcome.live,
            "Cache compacted"
        );
        outcome
    }

    /// Sorted copy of the id index and every secondary index.
    pub async fn index_snapshot(&self) -> IndexSnapshot {
        let state = self.state.lock().await;
        let mut snapshot = IndexSnapshot::new();
        snapshot.insert(
            PRIMARY_INDEX.to_string(),
            state.by_id.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        );
        for (name, map) in &state.indexes {
            snapshot.insert(
                (*name).to_string(),
                map.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            );
        }
        snapshot
    }

    /// Number of slots whose status is Deleted.
    #[cfg(test)]
    async fn tombstoned_slots(&self) -> usize {
        self.state
            .lock()
            .await
            .slots
            .iter()
            .filter(|r| !r.is_valid())
            .count()
    }
}
