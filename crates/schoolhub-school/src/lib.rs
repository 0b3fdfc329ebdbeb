//! # schoolhub-school
//!
//! Entity managers for the school domain. Each manager owns one
//! [`IndexedEntityCache`](schoolhub_cache::IndexedEntityCache) and adds
//! domain validation on top of it.
//!
//! - [`TeacherManager`], [`StudentManager`], [`SubjectManager`]
//! - [`ClassManager`] - classes plus reconciliation of their subject/teacher
//!   assignment rows through [`relation::diff`]

pub mod class;
pub mod relation;
pub mod student;
pub mod subject;
pub mod teacher;
mod validate;

pub use class::{
    Assignment, AssignmentReport, ClassManager, ClassPatch, MAX_GRADE, NewClass, SchoolClass,
};
pub use relation::{DiffMode, Relation, RelationDiff, diff};
pub use student::{Gender, NewStudent, Student, StudentManager, StudentPatch};
pub use subject::{Subject, SubjectManager, SubjectPatch};
pub use teacher::{NewTeacher, Teacher, TeacherManager, TeacherPatch};
