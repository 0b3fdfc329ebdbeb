//! Classes and their subject/teacher assignments.
//!
//! The class record caches its merged assignment list; each assignment is
//! also persisted as its own relation row
//! (`class_assignment/<class>/<subject>` -> teacher id), and those rows are
//! what [`ClassManager::update_assignments`] adds and removes.

use std::sync::Arc;

use schoolhub_cache::{CacheOptions, CachedEntity, DeleteReport, EntityPatch, IndexedEntityCache};
use schoolhub_core::{CoreError, Result, generate_id, validate_id};
use schoolhub_storage::DynStore;
use schoolhub_storage::keys::{assignment_key, assignment_prefix};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::relation::{DiffMode, Relation, RelationDiff, diff, normalize};
use crate::subject::SubjectManager;
use crate::teacher::TeacherManager;
use crate::validate::non_empty;

pub const CLASS_NAME_INDEX: &str = "name";

/// Highest grade a class may be in.
pub const MAX_GRADE: u8 = 12;

/// One teacher teaching one subject to a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub subject_id: String,
    pub teacher_id: String,
}

impl Assignment {
    pub fn new(subject_id: impl Into<String>, teacher_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            teacher_id: teacher_id.into(),
        }
    }
}

impl Relation for Assignment {
    fn key(&self) -> &str {
        &self.subject_id
    }
}

/// Outcome of [`ClassManager::update_assignments`].
pub type AssignmentReport = RelationDiff<Assignment>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    pub grade: u8,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl CachedEntity for SchoolClass {
    const NAMESPACE: &'static str = "class";
    const UNIQUE_INDEXES: &'static [&'static str] = &[CLASS_NAME_INDEX];

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![(CLASS_NAME_INDEX, self.name.clone())]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClass {
    pub name: String,
    pub grade: u8,
}

/// Changes to a class's own fields. Assignments go through
/// [`ClassManager::update_assignments`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassPatch {
    pub name: Option<String>,
    pub grade: Option<u8>,
}

impl EntityPatch<SchoolClass> for ClassPatch {
    fn apply_to(&self, current: &SchoolClass) -> SchoolClass {
        let mut next = current.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(grade) = self.grade {
            next.grade = grade;
        }
        next
    }

    fn is_empty(&self) -> bool {
        self.name.is_none() && self.grade.is_none()
    }
}

struct AssignmentsPatch<'a>(&'a [Assignment]);

impl EntityPatch<SchoolClass> for AssignmentsPatch<'_> {
    fn apply_to(&self, current: &SchoolClass) -> SchoolClass {
        SchoolClass {
            assignments: self.0.to_vec(),
            ..current.clone()
        }
    }
}

fn validate_grade(grade: u8) -> Result<u8> {
    if grade == 0 || grade > MAX_GRADE {
        return Err(CoreError::invalid_input(format!(
            "grade must be between 1 and {MAX_GRADE}, got {grade}"
        )));
    }
    Ok(grade)
}

/// Classes, plus reconciliation of their assignment rows.
pub struct ClassManager {
    cache: Arc<IndexedEntityCache<SchoolClass>>,
    store: DynStore,
    /// Held from reading a class's assignments until its rows and record
    /// are both written; class deletion takes it too.
    reconcile: Mutex<()>,
    subjects: Arc<SubjectManager>,
    teachers: Arc<TeacherManager>,
}

impl ClassManager {
    pub fn new(
        store: DynStore,
        subjects: Arc<SubjectManager>,
        teachers: Arc<TeacherManager>,
    ) -> Self {
        Self::with_options(store, subjects, teachers, CacheOptions::default())
    }

    pub fn with_options(
        store: DynStore,
        subjects: Arc<SubjectManager>,
        teachers: Arc<TeacherManager>,
        options: CacheOptions,
    ) -> Self {
        Self {
            cache: Arc::new(IndexedEntityCache::with_options(store.clone(), options)),
            store,
            reconcile: Mutex::new(()),
            subjects,
            teachers,
        }
    }

    pub fn cache(&self) -> &Arc<IndexedEntityCache<SchoolClass>> {
        &self.cache
    }

    pub async fn load(&self) -> Result<usize> {
        self.cache.load().await
    }

    pub async fn add(&self, input: NewClass) -> Result<SchoolClass> {
        let class = SchoolClass {
            id: generate_id(),
            name: non_empty("name", &input.name)?,
            grade: validate_grade(input.grade)?,
            assignments: Vec::new(),
        };
        let class = self.cache.add(class).await?;
        info!(id = %class.id, name = %class.name, grade = class.grade, "Class added");
        Ok(class)
    }

    pub async fn update(&self, id: &str, patch: ClassPatch) -> Result<SchoolClass> {
        let patch = ClassPatch {
            name: patch.name.as_deref().map(|n| non_empty("name", n)).transpose()?,
            grade: patch.grade.map(validate_grade).transpose()?,
        };
        self.cache.update(id, &patch).await
    }

    /// Deletes classes and their assignment rows.
    ///
    /// Row cleanup runs after the classes are gone from the cache; a failure
    /// there is returned but does not bring the classes back.
    pub async fn delete<S: AsRef<str>>(&self, ids: &[S]) -> Result<DeleteReport> {
        let _reconcile = self.reconcile.lock().await;
        let report = self.cache.delete(ids).await?;

        let mut row_keys = Vec::new();
        for class_id in &report.deleted {
            let rows = self.store.bulk_load(&assignment_prefix(class_id)).await?;
            row_keys.extend(rows.into_iter().map(|(key, _)| key));
        }
        if !row_keys.is_empty() {
            if let Err(e) = self.store.delete_many(&row_keys).await {
                warn!(
                    classes = ?report.deleted,
                    rows = row_keys.len(),
                    error = %e,
                    "Assignment row cleanup failed after class delete"
                );
                return Err(e.into());
            }
            debug!(rows = row_keys.len(), "Assignment rows removed");
        }
        Ok(report)
    }

    pub async fn get(&self, id: &str) -> Result<SchoolClass> {
        self.cache
            .get(id)
            .await
            .ok_or_else(|| CoreError::not_found(format!("class '{id}'")))
    }

    pub async fn get_by_name(&self, name: &str) -> Option<SchoolClass> {
        self.cache.get_by(CLASS_NAME_INDEX, name).await
    }

    pub async fn list(&self) -> Vec<SchoolClass> {
        self.cache.get_all().await
    }

    pub async fn list_by_grade(&self, grade: u8) -> Vec<SchoolClass> {
        self.cache.filter(|c| c.grade == grade).await
    }

    /// Classes in which `teacher_id` teaches at least one subject.
    pub async fn list_by_teacher(&self, teacher_id: &str) -> Vec<SchoolClass> {
        self.cache
            .filter(|c| c.assignments.iter().any(|a| a.teacher_id == teacher_id))
            .await
    }

    pub async fn count(&self) -> usize {
        self.cache.count().await
    }

    /// Reconciles a class's assignments with `requested`.
    ///
    /// Every referenced subject and teacher must exist; nothing is written
    /// until the whole request validates. An empty delta makes no store
    /// call. Otherwise removed rows are bulk-deleted, added rows are put and
    /// the class record is updated to the merged list, in that order.
    /// Concurrent calls run one at a time, so each diffs against the list
    /// the previous one stored. The steps are not transactional: a failure
    /// part-way leaves the rows already written in place, and retrying the
    /// same request converges.
    pub async fn update_assignments(
        &self,
        class_id: &str,
        requested: &[Assignment],
        mode: DiffMode,
    ) -> Result<AssignmentReport> {
        let _reconcile = self.reconcile.lock().await;
        let class = self.get(class_id).await?;
        let requested = normalize(requested);
        for assignment in &requested {
            self.validate_assignment(assignment).await?;
        }

        let report = diff(&class.assignments, &requested, mode);
        if report.is_empty() {
            debug!(class_id, "Assignments unchanged");
            return Ok(report);
        }

        if !report.removed.is_empty() {
            let keys: Vec<String> = report
                .removed
                .iter()
                .map(|a| assignment_key(class_id, &a.subject_id))
                .collect();
            self.store.delete_many(&keys).await?;
        }
        for assignment in &report.added {
            self.store
                .put(
                    &assignment_key(class_id, &assignment.subject_id),
                    assignment.teacher_id.clone(),
                )
                .await?;
        }
        self.cache
            .update(class_id, &AssignmentsPatch(&report.merged))
            .await?;

        info!(
            class_id,
            added = report.added.len(),
            removed = report.removed.len(),
            total = report.merged.len(),
            "Class assignments updated"
        );
        Ok(report)
    }

    async fn validate_assignment(&self, assignment: &Assignment) -> Result<()> {
        validate_id(&assignment.subject_id)?;
        validate_id(&assignment.teacher_id)?;
        if !self.subjects.exists(&assignment.subject_id).await {
            return Err(CoreError::invalid_input(format!(
                "unknown subject '{}'",
                assignment.subject_id
            )));
        }
        if !self.teachers.exists(&assignment.teacher_id).await {
            return Err(CoreError::invalid_input(format!(
                "unknown teacher '{}'",
                assignment.teacher_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teacher::NewTeacher;
    use schoolhub_storage::testing::FlakyStore;
    use schoolhub_storage::{InMemoryStore, PersistentStore};

    struct Fixture {
        store: Arc<InMemoryStore>,
        classes: ClassManager,
        subjects: Arc<SubjectManager>,
        teachers: Arc<TeacherManager>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let subjects = Arc::new(SubjectManager::new(store.clone()));
        let teachers = Arc::new(TeacherManager::new(store.clone()));
        let classes = ClassManager::new(store.clone(), subjects.clone(), teachers.clone());
        Fixture {
            store,
            classes,
            subjects,
            teachers,
        }
    }

    async fn teacher(teachers: &TeacherManager, no: &str) -> String {
        teachers
            .add(NewTeacher {
                name: format!("Teacher {no}"),
                teacher_no: no.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_grade_bounds() {
        let f = fixture();
        for grade in [0, MAX_GRADE + 1] {
            let err = f
                .classes
                .add(NewClass {
                    name: "X".into(),
                    grade,
                })
                .await
                .unwrap_err();
            assert_eq!(err.code(), "invalid_input");
        }
    }

    #[tokio::test]
    async fn test_teacher_swap_rewrites_single_row() {
        let f = fixture();
        let class = f
            .classes
            .add(NewClass {
                name: "7A".into(),
                grade: 7,
            })
            .await
            .unwrap();
        let s1 = f.subjects.add("Math").await.unwrap().id;
        let t1 = teacher(&f.teachers, "T1").await;
        let t2 = teacher(&f.teachers, "T2").await;

        let first = f
            .classes
            .update_assignments(&class.id, &[Assignment::new(&s1, &t1)], DiffMode::Merge)
            .await
            .unwrap();
        assert_eq!(first.added.len(), 1);
        assert!(first.removed.is_empty());

        let second = f
            .classes
            .update_assignments(&class.id, &[Assignment::new(&s1, &t2)], DiffMode::Merge)
            .await
            .unwrap();
        assert_eq!(second.removed, vec![Assignment::new(&s1, &t1)]);
        assert_eq!(second.added, vec![Assignment::new(&s1, &t2)]);
        assert_eq!(second.merged, vec![Assignment::new(&s1, &t2)]);

        let row = f
            .store
            .get(&assignment_key(&class.id, &s1))
            .await
            .unwrap();
        assert_eq!(row.as_deref(), Some(t2.as_str()));
        assert_eq!(
            f.classes.get(&class.id).await.unwrap().assignments,
            vec![Assignment::new(&s1, &t2)]
        );
        assert_eq!(f.classes.list_by_teacher(&t2).await.len(), 1);
        assert!(f.classes.list_by_teacher(&t1).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_references_rejected_before_writes() {
        let f = fixture();
        let class = f
            .classes
            .add(NewClass {
                name: "7A".into(),
                grade: 7,
            })
            .await
            .unwrap();
        let s1 = f.subjects.add("Math").await.unwrap().id;
        let t1 = teacher(&f.teachers, "T1").await;
        let before = f.store.len();

        let err = f
            .classes
            .update_assignments(
                &class.id,
                &[Assignment::new(&s1, &t1), Assignment::new("ghost", &t1)],
                DiffMode::Merge,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        let err = f
            .classes
            .update_assignments(&class.id, &[Assignment::new(&s1, "ghost")], DiffMode::Merge)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_input");

        assert_eq!(f.store.len(), before);
        assert!(f.classes.get(&class.id).await.unwrap().assignments.is_empty());

        let err = f
            .classes
            .update_assignments("ghost", &[], DiffMode::Merge)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_replace_mode_drops_unmentioned_rows() {
        let f = fixture();
        let class = f
            .classes
            .add(NewClass {
                name: "8B".into(),
                grade: 8,
            })
            .await
            .unwrap();
        let math = f.subjects.add("Math").await.unwrap().id;
        let art = f.subjects.add("Art").await.unwrap().id;
        let t1 = teacher(&f.teachers, "T1").await;

        f.classes
            .update_assignments(
                &class.id,
                &[Assignment::new(&math, &t1), Assignment::new(&art, &t1)],
                DiffMode::Merge,
            )
            .await
            .unwrap();
        assert_eq!(f.store.keys_with_prefix(&assignment_prefix(&class.id)).len(), 2);

        let report = f
            .classes
            .update_assignments(&class.id, &[Assignment::new(&art, &t1)], DiffMode::Replace)
            .await
            .unwrap();
        assert_eq!(report.removed, vec![Assignment::new(&math, &t1)]);
        assert_eq!(
            f.store.keys_with_prefix(&assignment_prefix(&class.id)),
            vec![assignment_key(&class.id, &art)]
        );
    }

    #[tokio::test]
    async fn test_unchanged_request_makes_no_store_call() {
        let store = Arc::new(FlakyStore::new());
        let subjects = Arc::new(SubjectManager::new(store.clone()));
        let teachers = Arc::new(TeacherManager::new(store.clone()));
        let classes = ClassManager::new(store.clone(), subjects.clone(), teachers.clone());

        let class = classes
            .add(NewClass {
                name: "9C".into(),
                grade: 9,
            })
            .await
            .unwrap();
        let s1 = subjects.add("Math").await.unwrap().id;
        let t1 = teacher(&teachers, "T1").await;
        let wanted = [Assignment::new(&s1, &t1)];
        classes
            .update_assignments(&class.id, &wanted, DiffMode::Merge)
            .await
            .unwrap();

        let puts = store.put_count();
        let deletes = store.delete_count();
        let report = classes
            .update_assignments(&class.id, &wanted, DiffMode::Merge)
            .await
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(store.put_count(), puts);
        assert_eq!(store.delete_count(), deletes);
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_rows_and_record_in_step() {
        let store = Arc::new(FlakyStore::new());
        let subjects = Arc::new(SubjectManager::new(store.clone()));
        let teachers = Arc::new(TeacherManager::new(store.clone()));
        let classes = ClassManager::new(store.clone(), subjects.clone(), teachers.clone());

        let class = classes
            .add(NewClass {
                name: "7A".into(),
                grade: 7,
            })
            .await
            .unwrap();
        let math = subjects.add("Math").await.unwrap().id;
        let art = subjects.add("Art").await.unwrap().id;
        let t1 = teacher(&teachers, "T1").await;

        store.yield_on_writes(true);
        let first = [Assignment::new(&math, &t1)];
        let second = [Assignment::new(&art, &t1)];
        let (a, b) = tokio::join!(
            classes.update_assignments(&class.id, &first, DiffMode::Merge),
            classes.update_assignments(&class.id, &second, DiffMode::Merge),
        );
        a.unwrap();
        b.unwrap();

        let rows = store.inner().keys_with_prefix(&assignment_prefix(&class.id));
        let cached = classes.get(&class.id).await.unwrap().assignments;
        assert_eq!(rows.len(), 2);
        assert_eq!(cached.len(), rows.len());
        for assignment in &cached {
            assert!(rows.contains(&assignment_key(&class.id, &assignment.subject_id)));
        }
    }

    #[tokio::test]
    async fn test_delete_class_removes_rows() {
        let f = fixture();
        let class = f
            .classes
            .add(NewClass {
                name: "7A".into(),
                grade: 7,
            })
            .await
            .unwrap();
        let s1 = f.subjects.add("Math").await.unwrap().id;
        let t1 = teacher(&f.teachers, "T1").await;
        f.classes
            .update_assignments(&class.id, &[Assignment::new(&s1, &t1)], DiffMode::Merge)
            .await
            .unwrap();

        let report = f.classes.delete(&[class.id.as_str()]).await.unwrap();
        assert_eq!(report.deleted, vec![class.id.clone()]);
        assert!(f.store.keys_with_prefix(&assignment_prefix(&class.id)).is_empty());
        assert!(!f.store.contains_key(&format!("class/{}", class.id)));
    }
}
