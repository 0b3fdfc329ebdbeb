use std::sync::Arc;

use schoolhub_cache::{CacheOptions, CachedEntity, DeleteReport, EntityPatch, IndexedEntityCache};
use schoolhub_core::{CoreError, Result, generate_id};
use schoolhub_storage::DynStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::validate::{non_empty, optional_trimmed};

/// Index over [`Teacher::teacher_no`].
pub const TEACHER_NO_INDEX: &str = "teacher_no";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: String,
    pub name: String,
    /// Staff number, unique across teachers.
    pub teacher_no: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl CachedEntity for Teacher {
    const NAMESPACE: &'static str = "teacher";
    const UNIQUE_INDEXES: &'static [&'static str] = &[TEACHER_NO_INDEX];

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![(TEACHER_NO_INDEX, self.teacher_no.clone())]
    }
}

/// Input for [`TeacherManager::add`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTeacher {
    pub name: String,
    pub teacher_no: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeacherPatch {
    pub name: Option<String>,
    pub teacher_no: Option<String>,
    pub phone: Option<String>,
    /// `Some(None)` clears the address.
    pub email: Option<Option<String>>,
}

impl EntityPatch<Teacher> for TeacherPatch {
    fn apply_to(&self, current: &Teacher) -> Teacher {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(teacher_no) = &self.teacher_no {
            next.teacher_no = teacher_no.clone();
        }
        if let Some(phone) = &self.phone {
            next.phone = phone.clone();
        }
        if let Some(email) = &self.email {
            next.email = email.clone();
        }
        next
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.teacher_no.is_none()
            && self.phone.is_none()
            && self.email.is_none()
    }
}

fn validate_teacher_no(teacher_no: &str) -> Result<String> {
    let teacher_no = non_empty("teacher_no", teacher_no)?;
    if !teacher_no.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::invalid_input(format!(
            "teacher_no '{teacher_no}' must be alphanumeric"
        )));
    }
    Ok(teacher_no)
}

/// Teacher records.
pub struct TeacherManager {
    cache: Arc<IndexedEntityCache<Teacher>>,
}

impl TeacherManager {
    pub fn new(store: DynStore) -> Self {
        Self::with_options(store, CacheOptions::default())
    }

    pub fn with_options(store: DynStore, options: CacheOptions) -> Self {
        Self {
            cache: Arc::new(IndexedEntityCache::with_options(store, options)),
        }
    }

    /// The underlying cache, for compaction and diagnostics.
    pub fn cache(&self) -> &Arc<IndexedEntityCache<Teacher>> {
        &self.cache
    }

    pub async fn load(&self) -> Result<usize> {
        self.cache.load().await
    }

    pub async fn add(&self, input: NewTeacher) -> Result<Teacher> {
        let teacher = Teacher {
            id: generate_id(),
            name: non_empty("name", &input.name)?,
            teacher_no: validate_teacher_no(&input.teacher_no)?,
            phone: input.phone.trim().to_string(),
            email: optional_trimmed(input.email),
        };
        let teacher = self.cache.add(teacher).await?;
        info!(id = %teacher.id, teacher_no = %teacher.teacher_no, "Teacher added");
        Ok(teacher)
    }

    pub async fn update(&self, id: &str, patch: TeacherPatch) -> Result<Teacher> {
        let patch = TeacherPatch {
            name: patch.name.as_deref().map(|n| non_empty("name", n)).transpose()?,
            teacher_no: patch
                .teacher_no
                .as_deref()
                .map(validate_teacher_no)
                .transpose()?,
            phone: patch.phone.map(|p| p.trim().to_string()),
            email: patch.email.map(optional_trimmed),
        };
        self.cache.update(id, &patch).await
    }

    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<DeleteReport> {
        self.cache.delete(ids).await
    }

    pub async fn get(&self, id: &str) -> Result<Teacher> {
        self.cache
            .get(id)
            .await
            .ok_or_else(|| CoreError::not_found(format!("teacher '{id}'")))
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.cache.contains(id).await
    }

    pub async fn get_by_number(&self, teacher_no: &str) -> Option<Teacher> {
        self.cache.get_by(TEACHER_NO_INDEX, teacher_no).await
    }

    pub async fn list(&self) -> Vec<Teacher> {
        self.cache.get_all().await
    }

    /// Case-insensitive substring match on the name.
    pub async fn search_by_name(&self, fragment: &str) -> Vec<Teacher> {
        let needle = fragment.to_lowercase();
        self.cache
            .filter(|t| t.name.to_lowercase().contains(&needle))
            .await
    }

    pub async fn count(&self) -> usize {
        self.cache.count().await
    }
}
