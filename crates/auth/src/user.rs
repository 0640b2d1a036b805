//! User accounts: stored identity, public profile, and registration rules.
//!
//! Accounts are created inactive and become active exactly once, when an
//! email verification token is redeemed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{DomainResult, FieldErrorsBuilder, UserId};

use crate::password::check_password_policy;

pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MAX_NAME_LENGTH: usize = 150;
pub const MAX_EMAIL_LENGTH: usize = 254;

// ─────────────────────────────────────────────────────────────────────────────
// Stored account
// ─────────────────────────────────────────────────────────────────────────────

/// A stored user account.
///
/// # Invariants
/// - `username` and `email` are unique across all accounts (store-enforced).
/// - `password_hash` is a PHC string; the raw password is never kept.
/// - `is_active` gates login; it flips to `true` only through verification
///   (or superuser bootstrap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// A freshly registered, not yet verified account.
    pub fn new_inactive(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: String,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            email: email.into(),
            password_hash,
            first_name: first_name.into(),
            last_name: last_name.into(),
            is_active: false,
            is_superuser: false,
            date_joined: now,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            is_superuser: self.is_superuser,
        }
    }
}

/// Public view of an account. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Registration request as submitted by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl Registration {
    /// Normalized email (trimmed, domain part lowercased).
    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }
}

/// Stateless registration checks (uniqueness is checked against the store).
///
/// Field errors are keyed by request field; the password mismatch is reported
/// under `non_field_errors`.
pub fn validate_registration(reg: &Registration) -> DomainResult<()> {
    let mut errors = FieldErrorsBuilder::new();

    if let Err(msg) = validate_username(&reg.username) {
        errors.add("username", msg);
    }
    if let Err(msg) = validate_email(&reg.email) {
        errors.add("email", msg);
    }
    for problem in check_password_policy(&reg.password, &reg.username) {
        errors.add("password", problem);
    }
    if reg.password != reg.password_confirm {
        errors.add("non_field_errors", "Password fields didn't match.");
    }
    for (field, value) in [("first_name", &reg.first_name), ("last_name", &reg.last_name)] {
        if value.as_deref().is_some_and(|v| v.chars().count() > MAX_NAME_LENGTH) {
            errors.add(field, format!("Ensure this field has no more than {MAX_NAME_LENGTH} characters."));
        }
    }

    errors.finish()
}

/// Usernames: 1..=150 characters of letters, digits and `@ . + - _`.
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.is_empty() {
        return Err("This field may not be blank.");
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err("Ensure this field has no more than 150 characters.");
    }
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if !username.chars().all(allowed) {
        return Err(
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
    Ok(())
}

/// Basic structural email check: one `@`, non-empty local part, dotted domain,
/// at most 254 characters.
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    let email = email.trim();
    if email.is_empty() {
        return Err("This field may not be blank.");
    }
    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err("Ensure this field has no more than 254 characters.");
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid { Ok(()) } else { Err("Enter a valid email address.") }
}

/// Trim and lowercase the domain part; the local part is kept as typed.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::DomainError;

    fn registration() -> Registration {
        Registration {
            username: "alice".to_string(),
            email: "alice@Example.com".to_string(),
            password: "correct-horse-battery".to_string(),
            password_confirm: "correct-horse-battery".to_string(),
            first_name: Some("Alice".to_string()),
            last_name: None,
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(validate_registration(&registration()).is_ok());
        assert_eq!(registration().normalized_email(), "alice@example.com");
    }

    #[test]
    fn password_mismatch_is_a_non_field_error() {
        let mut reg = registration();
        reg.password_confirm = "something-else-entirely".to_string();

        let DomainError::InvalidFields(fields) = validate_registration(&reg).unwrap_err() else {
            panic!("expected field errors");
        };
        assert_eq!(fields["non_field_errors"], vec!["Password fields didn't match.".to_string()]);
    }

    #[test]
    fn bad_username_and_email_reported_together() {
        let mut reg = registration();
        reg.username = "alice smith".to_string();
        reg.email = "not-an-email".to_string();

        let DomainError::InvalidFields(fields) = validate_registration(&reg).unwrap_err() else {
            panic!("expected field errors");
        };
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
    }

    #[test]
    fn email_longer_than_column_is_a_field_error() {
        let mut reg = registration();
        reg.email = format!("{}@example.com", "a".repeat(300));

        let DomainError::InvalidFields(fields) = validate_registration(&reg).unwrap_err() else {
            panic!("expected field errors");
        };
        assert_eq!(fields["email"], vec!["Ensure this field has no more than 254 characters.".to_string()]);

        let at_limit = format!("{}@example.com", "a".repeat(MAX_EMAIL_LENGTH - "@example.com".len()));
        assert!(validate_email(&at_limit).is_ok());
    }

    #[test]
    fn long_names_are_rejected_per_field() {
        let mut reg = registration();
        reg.first_name = Some("x".repeat(MAX_NAME_LENGTH + 1));
        reg.last_name = Some("y".repeat(MAX_NAME_LENGTH));

        let DomainError::InvalidFields(fields) = validate_registration(&reg).unwrap_err() else {
            panic!("expected field errors");
        };
        assert!(fields.contains_key("first_name"));
        assert!(!fields.contains_key("last_name"));
    }

    #[test]
    fn new_account_is_inactive_and_profile_hides_hash() {
        let user = User::new_inactive("bob", "bob@example.com", "$argon2id$x".into(), "", "", Utc::now());
        assert!(!user.is_active);
        assert!(!user.is_superuser);

        let json = serde_json::to_value(user.profile()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "bob");
    }
}
