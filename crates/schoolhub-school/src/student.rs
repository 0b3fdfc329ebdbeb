use std::fmt;
use std::sync::Arc;

use schoolhub_cache::{CacheOptions, CachedEntity, DeleteReport, EntityPatch, IndexedEntityCache};
use schoolhub_core::{CoreError, Result, generate_id};
use schoolhub_storage::DynStore;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::validate::{non_empty, optional_trimmed};

/// Index over [`Student::registration_no`].
pub const REGISTRATION_NO_INDEX: &str = "registration_no";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unspecified,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Unspecified => "unspecified",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    /// School registration number; digits only. Doubles as the login name.
    pub registration_no: String,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub gender: Gender,
}

impl CachedEntity for Student {
    const NAMESPACE: &'static str = "student";
    const UNIQUE_INDEXES: &'static [&'static str] = &[REGISTRATION_NO_INDEX];

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![(REGISTRATION_NO_INDEX, self.registration_no.clone())]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub registration_no: String,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub gender: Gender,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentPatch {
    pub name: Option<String>,
    /// The registration number doubles as the student's login name; an
    /// existing login keeps the old one until it is renamed in access
    /// control.
    pub registration_no: Option<String>,
    /// `Some(None)` removes the student from their class.
    pub class_id: Option<Option<String>>,
    pub gender: Option<Gender>,
}

impl EntityPatch<Student> for StudentPatch {
    fn apply_to(&self, current: &Student) -> Student {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(registration_no) = &self.registration_no {
            next.registration_no = registration_no.clone();
        }
        if let Some(class_id) = &self.class_id {
            next.class_id = class_id.clone();
        }
        if let Some(gender) = self.gender {
            next.gender = gender;
        }
        next
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.registration_no.is_none()
            && self.class_id.is_none()
            && self.gender.is_none()
    }
}

pub fn validate_registration_no(registration_no: &str) -> Result<String> {
    let registration_no = non_empty("registration_no", registration_no)?;
    if !registration_no.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::invalid_input(format!(
            "registration_no '{registration_no}' must contain only digits"
        )));
    }
    Ok(registration_no)
}

/// Student records.
pub struct StudentManager {
    cache: Arc<IndexedEntityCache<Student>>,
}

impl StudentManager {
    pub fn new(store: DynStore) -> Self {
        Self::with_options(store, CacheOptions::default())
    }

    pub fn with_options(store: DynStore, options: CacheOptions) -> Self {
        Self {
            cache: Arc::new(IndexedEntityCache::with_options(store, options)),
        }
    }

    pub fn cache(&self) -> &Arc<IndexedEntityCache<Student>> {
        &self.cache
    }

    pub async fn load(&self) -> Result<usize> {
        self.cache.load().await
    }

    pub async fn add(&self, input: NewStudent) -> Result<Student> {
        let student = Student {
            id: generate_id(),
            name: non_empty("name", &input.name)?,
            registration_no: validate_registration_no(&input.registration_no)?,
            class_id: optional_trimmed(input.class_id),
            gender: input.gender,
        };
        let student = self.cache.add(student).await?;
        info!(
            id = %student.id,
            registration_no = %student.registration_no,
            "Student added"
        );
        Ok(student)
    }

    pub async fn update(&self, id: &str, patch: StudentPatch) -> Result<Student> {
        let patch = StudentPatch {
            name: patch.name.as_deref().map(|n| non_empty("name", n)).transpose()?,
            registration_no: patch
                .registration_no
                .as_deref()
                .map(validate_registration_no)
                .transpose()?,
            class_id: patch.class_id.map(optional_trimmed),
            gender: patch.gender,
        };
        self.cache.update(id, &patch).await
    }

    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<DeleteReport> {
        self.cache.delete(ids).await
    }

    pub async fn get(&self, id: &str) -> Result<Student> {
        self.cache
            .get(id)
            .await
            .ok_or_else(|| CoreError::not_found(format!("student '{id}'")))
    }

    /// Resolves a registration number, the student login name.
    pub async fn find_by_registration_no(&self, registration_no: &str) -> Option<Student> {
        self.cache
            .get_by(REGISTRATION_NO_INDEX, registration_no)
            .await
    }

    pub async fn list(&self) -> Vec<Student> {
        self.cache.get_all().await
    }

    pub async fn list_by_class(&self, class_id: &str) -> Vec<Student> {
        self.cache
            .filter(|s| s.class_id.as_deref() == Some(class_id))
            .await
    }

    pub async fn count(&self) -> usize {
        self.cache.count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolhub_storage::InMemoryStore;

    fn manager() -> StudentManager {
        StudentManager::new(Arc::new(InMemoryStore::new()))
    }

    fn new_student(name: &str, registration_no: &str, class_id: Option<&str>) -> NewStudent {
        NewStudent {
            name: name.to_string(),
            registration_no: registration_no.to_string(),
            class_id: class_id.map(str::to_string),
            gender: Gender::Unspecified,
        }
    }

    #[tokio::test]
    async fn test_find_by_registration_no() {
        let students = manager();
        let added = students
            .add(new_student("Zhang San", "20190109", Some("c1")))
            .await
            .unwrap();

        let found = students.find_by_registration_no("20190109").await.unwrap();
        assert_eq!(found.id, added.id);
        assert!(students.find_by_registration_no("20190110").await.is_none());
    }

    #[tokio::test]
    async fn test_registration_no_must_be_digits() {
        let students = manager();
        let err = students
            .add(new_student("Ana", "2019-01", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");
    }

    #[tokio::test]
    async fn test_list_by_class_and_move() {
        let students = manager();
        let a = students.add(new_student("A", "1", Some("c1"))).await.unwrap();
        students.add(new_student("B", "2", Some("c2"))).await.unwrap();
        students.add(new_student("C", "3", Some("c1"))).await.unwrap();
        assert_eq!(students.list_by_class("c1").await.len(), 2);

        let moved = students
            .update(
                &a.id,
                StudentPatch {
                    class_id: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(moved.class_id.is_none());
        assert_eq!(students.list_by_class("c1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_registration_no_change_reindexes() {
        let students = manager();
        let a = students.add(new_student("A", "100", None)).await.unwrap();
        students
            .update(
                &a.id,
                StudentPatch {
                    registration_no: Some("200".into()),
                    gender: Some(Gender::Female),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(students.find_by_registration_no("100").await.is_none());
        let found = students.find_by_registration_no("200").await.unwrap();
        assert_eq!(found.gender, Gender::Female);
    }
}
