//! Short code syntax check for incoming redirects.

use serde_json::json;

use crate::AppError;

/// Longest code the `urls.short_code` column holds.
pub const MAX_CODE_LEN: usize = 32;

/// Rejects codes that cannot exist, so they never reach the cache or database.
///
/// Accepts 1 to [`MAX_CODE_LEN`] ASCII letters, digits, hyphens or underscores.
///
/// # Errors
///
/// Returns [`AppError::Validation`] describing the violated rule.
pub fn validate_short_code(code: &str) -> Result<(), AppError> {
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(AppError::bad_request(
            format!("Short code must be 1-{} characters", MAX_CODE_LEN),
            json!({ "provided_length": code.len() }),
        ));
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::bad_request(
            "Short code can only contain letters, digits, hyphens and underscores",
            json!({ "code": code }),
        ));
    }

    Ok(())
}
