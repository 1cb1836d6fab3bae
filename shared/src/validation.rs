//! # Generic Input Validation Helpers
//!
//! Domain-specific validation (share path rules, webhook URL SSRF checks,
//! ...) lives next to the domain it governs in `control-plane`. This module
//! holds only the validators reused across multiple aggregates.

use uuid::Uuid;

use crate::errors::ApiError;

/// Normalizes an email for case-insensitive lookups/uniqueness. Per §3,
/// `User.email` is unique case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::Validation(format!("{field} is not a valid identifier")))
}

/// Minimum password strength shared by registration, password reset, and
/// invite-redemption-with-new-user flows: at least 10 characters with at
/// least three of {upper, lower, digit, symbol} classes present.
pub fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    if password.len() < 10 {
        return Err(ApiError::Validation("password must be at least 10 characters".into()));
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());
    let classes = [has_upper, has_lower, has_digit, has_symbol].iter().filter(|b| **b).count();
    if classes < 3 {
        return Err(ApiError::Validation(
            "password must combine at least three of: uppercase, lowercase, digit, symbol".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_email_case_and_whitespace() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }

    #[test]
    fn rejects_missing_at_sign() {
        assert!(!is_valid_email("not-an-email"));
    }

    #[test]
    fn rejects_domain_without_dot() {
        assert!(!is_valid_email("user@localhost"));
    }

    #[test]
    fn parse_uuid_rejects_garbage() {
        assert!(parse_uuid("not-a-uuid", "share_id").is_err());
    }

    #[test]
    fn password_strength_requires_three_classes() {
        assert!(validate_password_strength("alllowercase").is_err());
        assert!(validate_password_strength("Abcdefghij1").is_ok());
        assert!(validate_password_strength("short1A").is_err());
    }
}
