//! Record-level authorization policy.
//!
//! One rule for every record-scoped operation:
//! - superusers may act on any record
//! - everyone else may act only on records they own
//!
//! Denials are reported as "not found" by the callers so that the existence
//! of other users' records never leaks.

use thiserror::Error;

use tally_core::{DomainError, UserId};

use crate::Principal;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: record belongs to another user")]
    NotOwner,
}

impl From<AuthzError> for DomainError {
    fn from(_: AuthzError) -> Self {
        DomainError::NotFound
    }
}

/// Which records a principal can see when listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    All,
    OwnedBy(UserId),
}

impl RecordScope {
    pub fn for_principal(principal: &Principal) -> Self {
        if principal.is_superuser {
            RecordScope::All
        } else {
            RecordScope::OwnedBy(principal.user_id)
        }
    }

    pub fn contains(&self, owner: UserId) -> bool {
        match self {
            RecordScope::All => true,
            RecordScope::OwnedBy(user) => *user == owner,
        }
    }
}

/// Authorize `principal` to act on a record owned by `owner`.
///
/// - No IO
/// - No panics
pub fn authorize_record(principal: &Principal, owner: UserId) -> Result<(), AuthzError> {
    if RecordScope::for_principal(principal).contains(owner) {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}
