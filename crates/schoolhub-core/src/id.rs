use crate::error::{CoreError, Result};

/// Longest identifier accepted by [`validate_id`].
pub const MAX_ID_LEN: usize = 64;

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Ids are used verbatim inside store keys, so `/` and whitespace are rejected.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(CoreError::invalid_input("id must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(CoreError::invalid_input(format!(
            "id must be at most {MAX_ID_LEN} characters"
        )));
    }
    if id.chars().any(|c| c == '/' || c.is_whitespace()) {
        return Err(CoreError::invalid_input(format!(
            "id '{id}' contains '/' or whitespace"
        )));
    }
    Ok(())
}
