//! Field checks shared by the coordinator and the responders.

/// Fails if `value` is empty or only whitespace.
pub fn require_non_blank(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} must not be blank"));
    }
    Ok(())
}

/// Fails unless `value` has a single `@` with text on both sides.
pub fn require_email(value: &str) -> Result<(), String> {
    let trimmed = value.trim();
    match trimmed.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(())
        }
        _ => Err(format!("email '{trimmed}' is not a valid address")),
    }
}

/// Canonical form of an email address: trimmed and lower-cased, so logins
/// differing only in case are one login.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Fails if `value` is negative.
pub fn require_non_negative(field: &str, value: i64) -> Result<(), String> {
    if value < 0 {
        return Err(format!("{field} must not be negative"));
    }
    Ok(())
}
