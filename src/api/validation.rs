//! Input validation for API requests.
//!
//! Validators return `Err(message)` with a user-facing message. To report
//! several fields at once, feed them to `ValidationErrorBuilder::check`.

use lazy_static::lazy_static;
use regex::Regex;

use crate::db::{Role, UserStatus};

lazy_static! {
    /// Something@something.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();

    /// Optional leading +, then digits with common separators
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9(][0-9 ().-]{5,23}$").unwrap();
}

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

pub fn validate_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name is required".to_string());
    }
    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(format!(
            "Name must be between {}-{} characters",
            NAME_MIN, NAME_MAX
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 || !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Emergency contact name or relation: required, at most `NAME_MAX` characters
pub fn validate_contact_field(label: &str, value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{} is required", label));
    }
    if value.chars().count() > NAME_MAX {
        return Err(format!("{} must be at most {} characters", label, NAME_MAX));
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), String> {
    let phone = phone.trim();
    if phone.is_empty() {
        return Err("Phone is required".to_string());
    }
    if !PHONE_REGEX.is_match(phone) {
        return Err("Invalid phone number".to_string());
    }
    Ok(())
}

/// Only checks presence; used where the password is compared, not set
pub fn validate_password_present(password: &str) -> Result<(), String> {
    if password.is_empty() {
        Err("Password is required".to_string())
    } else {
        Ok(())
    }
}

/// Strength rules for any password being set
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    validate_password_present(password)?;

    let length = password.chars().count();
    if length < PASSWORD_MIN {
        return Err(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN
        ));
    }
    if length > PASSWORD_MAX {
        return Err(format!(
            "Password is too long (max {} characters)",
            PASSWORD_MAX
        ));
    }

    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if !(has_lower && has_upper && has_digit && has_special) {
        return Err(
            "Password must contain at least one uppercase, one lowercase, one number and one special character"
                .to_string(),
        );
    }

    Ok(())
}

/// Roles a client may request at registration
pub fn parse_registration_role(role: Option<&str>) -> Result<Option<Role>, String> {
    let Some(raw) = role else {
        return Ok(None);
    };
    let role: Role = raw.parse().map_err(|_| "Invalid user type".to_string())?;
    if !role.is_self_assignable() {
        return Err("Invalid user type".to_string());
    }
    Ok(Some(role))
}

pub fn parse_role(role: &str) -> Result<Role, String> {
    role.parse().map_err(|_| {
        let allowed: Vec<String> = Role::ALL.iter().map(|r| r.to_string()).collect();
        format!("Role must be one of: {}", allowed.join(", "))
    })
}

pub fn parse_status(status: &str) -> Result<UserStatus, String> {
    status
        .parse()
        .map_err(|_| "Status must be one of: active, suspended, deleted".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("Ana").is_ok());
        assert!(validate_name("  Jo  ").is_ok());
        assert!(validate_name(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("A").is_err());
        assert!(validate_name(&"a".repeat(51)).is_err());
    }

    #[test]
    fn test_valid_emails() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email(" Ana.Maria+dir@sub.example.org ").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("ana").is_err());
        assert!(validate_email("ana@example").is_err());
        assert!(validate_email("ana maria@example.com").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_contact_fields() {
        assert!(validate_contact_field("Relation", "sister").is_ok());
        assert_eq!(
            validate_contact_field("Relation", "  "),
            Err("Relation is required".to_string())
        );
        assert!(validate_contact_field("Name", &"a".repeat(51)).is_err());

        assert!(validate_phone("+351 912 345 678").is_ok());
        assert!(validate_phone("(555) 010-0199").is_ok());
        assert!(validate_phone("").is_err());
        assert!(validate_phone("call me").is_err());
        assert!(validate_phone("12").is_err());
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Str0ngPass!").is_ok());
        assert!(validate_password_strength("NewPass1!").is_ok());

        assert!(validate_password_strength("").is_err());
        assert!(validate_password_strength("Sh0rt!").is_err());
        assert!(validate_password_strength("alllowercase1!").is_err());
        assert!(validate_password_strength("ALLUPPERCASE1!").is_err());
        assert!(validate_password_strength("NoDigitsHere!").is_err());
        assert!(validate_password_strength("NoSpecial123").is_err());
    }

    #[test]
    fn test_password_length_counts_characters() {
        // 124 characters, 244 bytes
        let accented = format!("Aa1!{}", "é".repeat(120));
        assert!(validate_password_strength(&accented).is_ok());

        let too_long = format!("Aa1!{}", "é".repeat(125));
        assert!(validate_password_strength(&too_long).is_err());
    }

    #[test]
    fn test_registration_role() {
        assert_eq!(parse_registration_role(None), Ok(None));
        assert_eq!(parse_registration_role(Some("caregiver")), Ok(Some(Role::Caregiver)));
        assert!(parse_registration_role(Some("admin")).is_err());
        assert!(parse_registration_role(Some("provider")).is_err());
        assert!(parse_registration_role(Some("wizard")).is_err());
    }

    #[test]
    fn test_parse_role_and_status() {
        assert_eq!(parse_role("admin"), Ok(Role::Admin));
        assert!(parse_role("root").unwrap_err().contains("caregiver"));
        assert_eq!(parse_status("suspended"), Ok(UserStatus::Suspended));
        assert!(parse_status("banned").is_err());
    }
}
