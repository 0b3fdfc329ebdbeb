//! Service wiring.
//!
//! [`AppContext`] owns every manager, access control and the compactor
//! tasks. Construction restores state from the store; nothing serves
//! requests until it returns.

use std::sync::Arc;
use std::time::Duration;

use schoolhub_auth::AccessControl;
use schoolhub_cache::{CacheStats, CachedEntity, Compactor, CompactorHandle, IndexedEntityCache};
use schoolhub_core::Result;
use schoolhub_school::{ClassManager, StudentManager, SubjectManager, TeacherManager};
use schoolhub_storage::{DynStore, InMemoryStore};
use tracing::info;

use crate::config::{AppConfig, StorageBackend};

pub struct AppContext {
    pub store: DynStore,
    pub teachers: Arc<TeacherManager>,
    pub students: Arc<StudentManager>,
    pub subjects: Arc<SubjectManager>,
    pub classes: Arc<ClassManager>,
    pub access: Arc<AccessControl>,
    compactors: Vec<CompactorHandle>,
}

impl AppContext {
    /// Opens the configured store and builds the context over it.
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let store: DynStore = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        };
        Self::with_store(store, config).await
    }

    /// Builds every service over `store`, loads persisted state and starts
    /// one compactor per cache.
    pub async fn with_store(store: DynStore, config: &AppConfig) -> Result<Self> {
        let options = config.cache.options();
        let teachers = Arc::new(TeacherManager::with_options(store.clone(), options));
        let students = Arc::new(StudentManager::with_options(store.clone(), options));
        let subjects = Arc::new(SubjectManager::with_options(store.clone(), options));
        let classes = Arc::new(ClassManager::with_options(
            store.clone(),
            subjects.clone(),
            teachers.clone(),
            options,
        ));
        let access = Arc::new(AccessControl::new(
            store.clone(),
            students.clone(),
            config.auth.clone(),
        )?);

        let loaded_teachers = teachers.load().await?;
        let loaded_students = students.load().await?;
        let loaded_subjects = subjects.load().await?;
        let loaded_classes = classes.load().await?;
        let loaded_logins = access.load().await?;
        info!(
            backend = store.backend_name(),
            teachers = loaded_teachers,
            students = loaded_students,
            subjects = loaded_subjects,
            classes = loaded_classes,
            logins = loaded_logins,
            "State restored from store"
        );

        let interval = config.cache.compaction_interval;
        let compactors = vec![
            spawn_compactor(teachers.cache(), interval),
            spawn_compactor(students.cache(), interval),
            spawn_compactor(subjects.cache(), interval),
            spawn_compactor(classes.cache(), interval),
        ];

        Ok(Self {
            store,
            teachers,
            students,
            subjects,
            classes,
            access,
            compactors,
        })
    }

    /// Per-namespace cache statistics.
    pub async fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.teachers.cache().namespace(), self.teachers.cache().stats().await),
            (self.students.cache().namespace(), self.students.cache().stats().await),
            (self.subjects.cache().namespace(), self.subjects.cache().stats().await),
            (self.classes.cache().namespace(), self.classes.cache().stats().await),
        ]
    }

    /// Stops the compactors.
    pub async fn shutdown(self) {
        for handle in self.compactors {
            handle.shutdown().await;
        }
        info!("Application context shut down");
    }
}

fn spawn_compactor<E: CachedEntity>(
    cache: &Arc<IndexedEntityCache<E>>,
    interval: Duration,
) -> CompactorHandle {
    Compactor::spawn(Arc::clone(cache), interval)
}
