//! Input validation for user-supplied fields.

use std::fmt;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Empty value where one is required.
    Empty(String),
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Invalid URL.
    InvalidUrl(String),
    /// Invalid phone number.
    InvalidPhone(String),
    /// Value outside the accepted set or range.
    Invalid { field: String, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            ValidationError::InvalidPhone(msg) => write!(f, "Invalid phone number: {}", msg),
            ValidationError::Invalid { field, reason } => write!(f, "Invalid {}: {}", field, reason),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Maximum allowed length for names (events, workflows, segments, ...).
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum allowed length for URLs.
pub const MAX_URL_LENGTH: usize = 2048;

/// Maximum allowed length for free text such as notification bodies.
pub const MAX_TEXT_LENGTH: usize = 4096;

/// Validate a required, length-bounded text field.
pub fn validate_required(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Empty(field.to_string()));
    }

    let actual = value.chars().count();
    if actual > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
            actual,
        });
    }

    Ok(())
}

/// Validate a record name.
pub fn validate_name(field: &str, value: &str) -> Result<(), ValidationError> {
    validate_required(field, value, MAX_NAME_LENGTH)
}

/// Validate an absolute http(s) URL.
pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    validate_required("url", url, MAX_URL_LENGTH)?;

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ValidationError::InvalidUrl("must start with http:// or https://".to_string()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(ValidationError::InvalidUrl("missing host".to_string()));
    }

    if url.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidUrl("must not contain whitespace".to_string()));
    }

    Ok(())
}

/// Validate a phone number in international format (optional `+`, 7-15 digits).
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let phone = phone.trim();

    if phone.is_empty() {
        return Err(ValidationError::Empty("phone".to_string()));
    }

    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPhone(
            "only digits and a leading + are allowed".to_string(),
        ));
    }

    if !(7..=15).contains(&digits.len()) {
        return Err(ValidationError::InvalidPhone(format!(
            "expected 7-15 digits, got {}",
            digits.len()
        )));
    }

    Ok(())
}

/// Validate that a value is one of the accepted options.
pub fn validate_one_of(field: &str, value: &str, accepted: &[&str]) -> Result<(), ValidationError> {
    if accepted.contains(&value) {
        return Ok(());
    }

    Err(ValidationError::Invalid {
        field: field.to_string(),
        reason: format!("expected one of {}", accepted.join(", ")),
    })
}
