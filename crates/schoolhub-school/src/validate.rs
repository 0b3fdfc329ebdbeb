use schoolhub_core::{CoreError, Result};

/// Trims `value` and rejects it if nothing is left.
pub(crate) fn non_empty(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid_input(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Trims an optional value; blank becomes `None`.
pub(crate) fn optional_trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
