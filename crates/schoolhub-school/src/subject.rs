use std::sync::Arc;

use schoolhub_cache::{CacheOptions, CachedEntity, DeleteReport, EntityPatch, IndexedEntityCache};
use schoolhub_core::{CoreError, Result, generate_id};
use schoolhub_storage::DynStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::validate::non_empty;

pub const SUBJECT_NAME_INDEX: &str = "name";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
}

impl CachedEntity for Subject {
    const NAMESPACE: &'static str = "subject";
    const UNIQUE_INDEXES: &'static [&'static str] = &[SUBJECT_NAME_INDEX];

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![(SUBJECT_NAME_INDEX, self.name.clone())]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectPatch {
    pub name: Option<String>,
}

impl EntityPatch<Subject> for SubjectPatch {
    fn apply_to(&self, current: &Subject) -> Subject {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        next
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
    }
}

/// Subject catalogue.
pub struct SubjectManager {
    cache: Arc<IndexedEntityCache<Subject>>,
}

impl SubjectManager {
    pub fn new(store: DynStore) -> Self {
        Self::with_options(store, CacheOptions::default())
    }

    pub fn with_options(store: DynStore, options: CacheOptions) -> Self {
        Self {
            cache: Arc::new(IndexedEntityCache::with_options(store, options)),
        }
    }

    pub fn cache(&self) -> &Arc<IndexedEntityCache<Subject>> {
        &self.cache
    }

    pub async fn load(&self) -> Result<usize> {
        self.cache.load().await
    }

    pub async fn add(&self, name: &str) -> Result<Subject> {
        let subject = Subject {
            id: generate_id(),
            name: non_empty("name", name)?,
        };
        let subject = self.cache.add(subject).await?;
        info!(id = %subject.id, name = %subject.name, "Subject added");
        Ok(subject)
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<Subject> {
        let patch = SubjectPatch {
            name: Some(non_empty("name", name)?),
        };
        self.cache.update(id, &patch).await
    }

    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<DeleteReport> {
        self.cache.delete(ids).await
    }

    pub async fn get(&self, id: &str) -> Result<Subject> {
        self.cache
            .get(id)
            .await
            .ok_or_else(|| CoreError::not_found(format!("subject '{id}'")))
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.cache.contains(id).await
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Subject> {
        self.cache.get_by(SUBJECT_NAME_INDEX, name).await
    }

    pub async fn list(&self) -> Vec<Subject> {
        self.cache.get_all().await
    }

    pub async fn count(&self) -> usize {
        self.cache.count().await
    }
}
