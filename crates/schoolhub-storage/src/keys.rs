//! Store key layout.
//!
//! ```text
//! <namespace>/<id>                       entity records (teacher, student, ...)
//! class_assignment/<class_id>/<subject>  relation rows, value = teacher id
//! login/<principal_type>/<login_name>    login records
//! token/<token>                          login record bound to a live token
//! settings/<name>                        sentinel settings
//! ```

pub const CLASS_ASSIGNMENT: &str = "class_assignment";
pub const LOGIN: &str = "login";
pub const TOKEN: &str = "token";
pub const SETTINGS: &str = "settings";

/// Sentinel: whether newly provisioned logins use the remembered default password.
pub const ALLOW_DEFAULT_PASSWORD: &str = "settings/allow_default_password";
/// Sentinel: the remembered default password.
pub const DEFAULT_PASSWORD: &str = "settings/default_password";

pub fn entity_key(namespace: &str, id: &str) -> String {
    format!("{namespace}/{id}")
}

/// Prefix matching every key of a namespace, including the trailing `/`.
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{namespace}/")
}

pub fn assignment_key(class_id: &str, subject_id: &str) -> String {
    format!("{CLASS_ASSIGNMENT}/{class_id}/{subject_id}")
}

pub fn assignment_prefix(class_id: &str) -> String {
    format!("{CLASS_ASSIGNMENT}/{class_id}/")
}

pub fn login_key(principal_type: &str, login_name: &str) -> String {
    format!("{LOGIN}/{principal_type}/{login_name}")
}

pub fn token_key(token: &str) -> String {
    format!("{TOKEN}/{token}")
}
