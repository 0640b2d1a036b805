//! Persistence boundary: async store traits plus in-memory and Postgres
//! implementations.
//!
//! The traits are split by concern but every backend implements all of them;
//! services hold a single `Arc<dyn Store>`.

pub mod in_memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use tally_auth::{RecordScope, User, VerificationKey, VerificationToken};
use tally_core::{RecordId, TokenId, UserId};
use tally_ledger::{LedgerRecord, RecordPatch, TransactionType};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Store operation error.
///
/// These are **infrastructure errors**; "not found" is expressed as `Ok(None)`
/// / `Ok(false)` by the individual operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else the backend reported.
    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account. Duplicate username or email is a `Conflict`.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Insert a new account together with its first verification token.
    ///
    /// Either both rows are written or neither is.
    async fn insert_user_with_token(&self, user: &User, token: &VerificationToken) -> Result<(), StoreError>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Case-insensitive email lookup.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait::async_trait]
pub trait VerificationStore: Send + Sync {
    async fn insert_token(&self, token: &VerificationToken) -> Result<(), StoreError>;

    /// Close every pending token of `user_id` and insert `token`, atomically.
    ///
    /// Returns how many tokens were closed.
    async fn replace_pending_tokens(
        &self,
        user_id: UserId,
        token: &VerificationToken,
    ) -> Result<u64, StoreError>;

    /// The pending token carrying `key`, if any.
    async fn pending_token_by_key(
        &self,
        key: &VerificationKey,
    ) -> Result<Option<VerificationToken>, StoreError>;

    /// Pending tokens of a user, newest first.
    async fn pending_tokens_for(&self, user_id: UserId) -> Result<Vec<VerificationToken>, StoreError>;

    /// Atomically mark the token redeemed and activate its owner.
    ///
    /// Conditional on the token still being pending: returns `Ok(None)` (and
    /// changes nothing) when it was redeemed or closed in the meantime.
    async fn redeem_and_activate(
        &self,
        token_id: TokenId,
        verified_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;
}

/// Filter for record listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordQuery {
    pub scope: RecordScope,
    pub transaction_type: Option<TransactionType>,
}

impl RecordQuery {
    pub fn new(scope: RecordScope) -> Self {
        Self {
            scope,
            transaction_type: None,
        }
    }

    pub fn with_type(mut self, transaction_type: Option<TransactionType>) -> Self {
        self.transaction_type = transaction_type;
        self
    }

    pub fn matches(&self, record: &LedgerRecord) -> bool {
        self.scope.contains(record.owner)
            && self
                .transaction_type
                .is_none_or(|t| t == record.transaction_type)
    }
}

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_record(&self, record: &LedgerRecord) -> Result<(), StoreError>;

    async fn record_by_id(&self, id: RecordId) -> Result<Option<LedgerRecord>, StoreError>;

    /// Apply `patch` to the current stored row and set `updated_at`, in one
    /// write. Returns the updated record, or `None` if it is gone.
    async fn update_record(
        &self,
        id: RecordId,
        patch: &RecordPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LedgerRecord>, StoreError>;

    /// `false` if nothing was deleted.
    async fn delete_record(&self, id: RecordId) -> Result<bool, StoreError>;

    async fn count_records(&self, query: RecordQuery) -> Result<u64, StoreError>;

    /// Matching records, newest first (`created_at` desc, then id desc).
    async fn list_records(
        &self,
        query: RecordQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LedgerRecord>, StoreError>;
}

/// Revoked refresh tokens, keyed by `jti`.
#[async_trait::async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Idempotent.
    async fn revoke(&self, jti: Uuid, user_id: UserId, expires_at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError>;

    /// Drop entries whose token has expired by `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Everything a backend provides.
pub trait Store: UserStore + VerificationStore + RecordStore + TokenBlacklist {}

impl<T> Store for T where T: UserStore + VerificationStore + RecordStore + TokenBlacklist {}
