//! Managers rebuilt over the same store see what earlier instances wrote.

use std::sync::Arc;

use schoolhub_school::{
    Assignment, ClassManager, DiffMode, NewClass, NewStudent, NewTeacher, StudentManager,
    SubjectManager, TeacherManager,
};
use schoolhub_storage::{DynStore, InMemoryStore};

struct School {
    students: StudentManager,
    teachers: Arc<TeacherManager>,
    subjects: Arc<SubjectManager>,
    classes: ClassManager,
}

fn school(store: DynStore) -> School {
    let teachers = Arc::new(TeacherManager::new(store.clone()));
    let subjects = Arc::new(SubjectManager::new(store.clone()));
    School {
        students: StudentManager::new(store.clone()),
        classes: ClassManager::new(store, subjects.clone(), teachers.clone()),
        teachers,
        subjects,
    }
}

#[tokio::test]
async fn test_state_survives_reload() {
    let store: DynStore = Arc::new(InMemoryStore::new());

    let first = school(store.clone());
    let teacher = first
        .teachers
        .add(NewTeacher {
            name: "Li Wei".into(),
            teacher_no: "T1".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let math = first.subjects.add("Math").await.unwrap();
    let class = first
        .classes
        .add(NewClass {
            name: "7A".into(),
            grade: 7,
        })
        .await
        .unwrap();
    first
        .classes
        .update_assignments(
            &class.id,
            &[Assignment::new(&math.id, &teacher.id)],
            DiffMode::Merge,
        )
        .await
        .unwrap();
    let kept = first
        .students
        .add(NewStudent {
            name: "Zhang San".into(),
            registration_no: "20190109".into(),
            class_id: Some(class.id.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    let dropped = first
        .students
        .add(NewStudent {
            name: "Li Si".into(),
            registration_no: "20190110".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    first.students.delete(&[dropped.id.as_str()]).await.unwrap();

    let second = school(store);
    assert_eq!(second.teachers.load().await.unwrap(), 1);
    assert_eq!(second.subjects.load().await.unwrap(), 1);
    assert_eq!(second.classes.load().await.unwrap(), 1);
    assert_eq!(second.students.load().await.unwrap(), 1);

    let reloaded = second.classes.get(&class.id).await.unwrap();
    assert_eq!(
        reloaded.assignments,
        vec![Assignment::new(&math.id, &teacher.id)]
    );
    assert_eq!(
        second
            .students
            .find_by_registration_no("20190109")
            .await
            .unwrap()
            .id,
        kept.id
    );
    assert!(
        second
            .students
            .find_by_registration_no("20190110")
            .await
            .is_none()
    );
    assert_eq!(second.students.list_by_class(&class.id).await.len(), 1);
}
