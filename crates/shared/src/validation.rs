//! Common validation utilities.

use chrono::NaiveDate;
use validator::{ValidateEmail, ValidationError};

/// Maximum length of a promotion code.
pub const MAX_PROMO_CODE_LENGTH: usize = 32;

/// Normalizes an email address for comparisons and unique keys.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns true if the (trimmed) value is a syntactically valid email.
pub fn is_valid_email(email: &str) -> bool {
    email.trim().validate_email()
}

/// Normalizes a user-entered promotion code (trimmed, upper case).
pub fn normalize_promo_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Validates a promotion code: 3-32 characters of A-Z, 0-9, `-` or `_`.
pub fn validate_promo_code(code: &str) -> Result<(), ValidationError> {
    let normalized = normalize_promo_code(code);
    let valid_chars = normalized
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if (3..=MAX_PROMO_CODE_LENGTH).contains(&normalized.len()) && valid_chars {
        Ok(())
    } else {
        let mut err = ValidationError::new("promo_code_format");
        err.message = Some("Promotion code must be 3-32 letters, digits, '-' or '_'".into());
        Err(err)
    }
}

/// Validates a discount percentage (1 to 100 inclusive).
pub fn validate_percent_off(percent: i32) -> Result<(), ValidationError> {
    if (1..=100).contains(&percent) {
        Ok(())
    } else {
        let mut err = ValidationError::new("percent_off_range");
        err.message = Some("percent_off must be between 1 and 100".into());
        Err(err)
    }
}

/// Parses an ISO-8601 calendar date (`YYYY-MM-DD`).
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
