//! Form-level input checks shared by the public workflows.

use crate::error::{AppError, Result};

/// Strip whitespace and require exactly 10 digits
pub fn normalize_phone(raw: &str) -> Result<String> {
    let phone: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation(
            "Phone number must contain exactly 10 digits",
        ));
    }
    Ok(phone)
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AppError::validation(format!("Invalid email address: {}", raw.trim())));
    }
    Ok(email)
}

pub fn require_name(raw: &str, field: &str) -> Result<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Trimmed optional text; blank becomes None
pub fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
