//! # schoolhub-cache
//!
//! The in-memory cache pattern shared by every entity manager.
//!
//! An [`IndexedEntityCache`] keeps an append-only sequence of
//! [`EntityRecord`]s plus unique secondary indexes mapping keys to slots.
//! Mutations are written through to a [`PersistentStore`] before they touch
//! memory. Deletes are soft: the slot becomes a tombstone and stays until a
//! [`Compactor`] rebuilds the sequence.
//!
//! ## Modules
//!
//! - [`entity`] - the [`CachedEntity`] / [`EntityPatch`] traits and record wrapper
//! - [`cache`] - the indexed cache itself
//! - [`compactor`] - the background compaction worker
//!
//! [`PersistentStore`]: schoolhub_storage::PersistentStore

pub mod cache;
pub mod compactor;
pub mod entity;

pub use cache::{
    CacheOptions, CacheStats, CompactionOutcome, DEFAULT_TOMBSTONE_RATIO, DeleteReport,
    IndexSnapshot, IndexedEntityCache, PRIMARY_INDEX,
};
pub use compactor::{Compactor, CompactorHandle, DEFAULT_COMPACTION_INTERVAL};
pub use entity::{CachedEntity, EntityPatch, EntityRecord, EntityStatus};
