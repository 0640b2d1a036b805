//! Service-layer error: what the HTTP layer turns into a status code.

use thiserror::Error;

use tally_core::DomainError;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Deterministic domain failure (validation, not found, expired, ...).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Missing or unusable credentials (bad bearer, bad refresh token).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The persistence backend failed.
    #[error(transparent)]
    Store(StoreError),

    /// Anything else that is not the caller's fault (hashing, token signing).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(msg))
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            // A unique constraint lost a race against the pre-checks.
            StoreError::Conflict(msg) => ServiceError::Domain(DomainError::Conflict(msg)),
            other => ServiceError::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
