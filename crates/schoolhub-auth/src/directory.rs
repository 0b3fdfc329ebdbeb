//! Resolution of login names to principals that exist outside access control.

use async_trait::async_trait;
use schoolhub_school::StudentManager;

/// Looks up students by login name, for provisioning on first login.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    /// Returns the student id registered under `registration_no`.
    async fn resolve_student(&self, registration_no: &str) -> Option<String>;
}

#[async_trait]
impl StudentDirectory for StudentManager {
    async fn resolve_student(&self, registration_no: &str) -> Option<String> {
        self.find_by_registration_no(registration_no)
            .await
            .map(|student| student.id)
    }
}
