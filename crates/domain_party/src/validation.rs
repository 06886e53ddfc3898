//! Party validation rules
//!
//! Field rules shared by the person, user and organisation aggregates.
//!
//! # Rules
//!
//! - **Email**: RFC-style address, checked with `validator`
//! - **Phone**: digits with optional leading `+`, spaces, hyphens and
//!   parentheses; 8 to 15 digits
//! - **Organisation alias**: lowercase letters, digits and hyphens, no
//!   leading or trailing hyphen, at most 64 characters
//! - **Password**: at least 8 characters with at least one letter and one
//!   digit

use validator::ValidateEmail;

use crate::error::PartyError;

pub const MAX_ALIAS_LENGTH: usize = 64;
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Result of validating a set of fields
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Non-fatal findings
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        if !other.is_valid {
            self.is_valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts into a `Result`, keeping warnings out of the error
    pub fn into_result(self) -> Result<(), PartyError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(PartyError::validation_failed(self.errors))
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

pub fn is_valid_email(email: &str) -> bool {
    email.validate_email()
}

pub fn validate_email(email: &str) -> Result<(), PartyError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(PartyError::validation_failed(vec![format!(
            "email: '{}' is not a valid email address",
            email
        )]))
    }
}

pub fn is_valid_phone(phone: &str) -> bool {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'))
    {
        return false;
    }
    let digits = body.chars().filter(char::is_ascii_digit).count();
    (8..=15).contains(&digits)
}

/// Checks an organisation alias
pub fn validate_alias(alias: &str) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if alias.is_empty() {
        result.add_error("alias: must not be empty");
        return result;
    }
    if alias.len() > MAX_ALIAS_LENGTH {
        result.add_error(format!("alias: must be at most {} characters", MAX_ALIAS_LENGTH));
    }
    if !alias
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        result.add_error("alias: may only contain lowercase letters, digits and hyphens");
    }
    if alias.starts_with('-') || alias.ends_with('-') {
        result.add_error("alias: must not start or end with a hyphen");
    }
    result
}

pub fn validate_name(field: &str, value: &str) -> ValidationResult {
    let mut result = ValidationResult::ok();
    if value.trim().is_empty() {
        result.add_error(format!("{}: must not be empty", field));
    } else if value.trim() != value {
        result.add_warning(format!("{}: has leading or trailing whitespace", field));
    }
    result
}

pub fn validate_password(password: &str) -> ValidationResult {
    let mut result = ValidationResult::ok();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        result.add_error(format!(
            "password: must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    if !password.chars().any(char::is_alphabetic) {
        result.add_error("password: must contain a letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        result.add_error("password: must contain a digit");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_rules() {
        assert!(validate_alias("acme-insurance").is_valid);
        assert!(validate_alias("broker42").is_valid);

        assert!(!validate_alias("").is_valid);
        assert!(!validate_alias("Acme").is_valid);
        assert!(!validate_alias("-acme").is_valid);
        assert!(!validate_alias("acme-").is_valid);
        assert!(!validate_alias("acme_insurance").is_valid);
        assert!(!validate_alias(&"a".repeat(65)).is_valid);
        assert!(validate_alias(&"a".repeat(64)).is_valid);
    }

    #[test]
    fn test_email() {
        assert!(is_valid_email("jo@example.com"));
        assert!(!is_valid_email("not-an-email"));
        assert!(validate_email("missing-at.example.com").is_err());
    }

    #[test]
    fn test_phone() {
        assert!(is_valid_phone("+61 412 345 678"));
        assert!(is_valid_phone("(02) 9999-0000"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("0412 ABC 678"));
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("hunter2hunter").is_valid);

        let result = validate_password("short1");
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);

        let result = validate_password("onlyletters");
        assert!(result.errors.iter().any(|e| e.contains("digit")));
    }

    #[test]
    fn test_name_warnings_do_not_fail() {
        let result = validate_name("name", " Acme ");
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(!validate_name("name", "  ").is_valid);
    }
}
