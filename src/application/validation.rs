//! Input normalization shared by the catalog services.

use crate::application::error::CatalogError;

const MAX_NAME_LEN: usize = 200;

/// Trim `value` and reject it when empty or overly long.
pub(crate) fn ensure_non_empty(value: &str, field: &'static str) -> Result<String, CatalogError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::validation(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CatalogError::validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim optional free text, mapping blank input to `None`.
pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
