//! Domain error model.

use std::collections::BTreeMap;

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Field name → human readable messages, in stable (sorted) order.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// lifecycle, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input failed validation as a whole (not tied to a single field).
    #[error("validation failed: {0}")]
    Validation(String),

    /// One or more fields failed validation.
    #[error("validation failed: {}", summarize(.0))]
    InvalidFields(FieldErrors),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The resource does not exist in the caller's visible scope.
    #[error("not found")]
    NotFound,

    /// A time-bound credential was used after its window closed.
    #[error("expired")]
    Expired,

    /// A uniqueness or state conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A session token could not be decoded, verified or revoked.
    #[error("invalid token")]
    InvalidToken,

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Single-field validation error.
    pub fn field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), vec![msg.into()]);
        Self::InvalidFields(fields)
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

fn summarize(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, msgs)| format!("{field}: {}", msgs.join(" ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates per-field validation failures before turning them into one error.
#[derive(Debug, Default, Clone)]
pub struct FieldErrorsBuilder {
    fields: FieldErrors,
}

impl FieldErrorsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, msg: impl Into<String>) {
        self.fields.entry(field.to_string()).or_default().push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise `DomainError::InvalidFields`.
    pub fn finish(self) -> DomainResult<()> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(DomainError::InvalidFields(self.fields))
        }
    }
}
