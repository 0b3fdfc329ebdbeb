//! Persistent store abstraction for SchoolHub.
//!
//! The core treats the store as the authority of record: every cache
//! mutation is written here first and only then applied in memory.
//!
//! - [`PersistentStore`] - the async key-value contract consumed by the core
//! - [`InMemoryStore`] - a `DashMap`-backed implementation for tests and demos
//! - [`keys`] - the key layout shared by caches and access control

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;

pub use error::{ErrorCategory, StorageError};
pub use memory::InMemoryStore;
pub use traits::{DynStore, PersistentStore};
