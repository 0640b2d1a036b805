use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tally_auth::{User, VerificationKey, VerificationToken};
use tally_core::{RecordId, TokenId, UserId};
use tally_ledger::{LedgerRecord, RecordPatch, sort_newest_first};

use super::{RecordQuery, RecordStore, StoreError, TokenBlacklist, UserStore, VerificationStore};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    tokens: HashMap<TokenId, VerificationToken>,
    records: HashMap<RecordId, LedgerRecord>,
    /// Revoked `jti` → token expiry.
    revoked: HashMap<Uuid, DateTime<Utc>>,
}

impl State {
    fn ensure_user_unique(&self, user: &User) -> Result<(), StoreError> {
        if self.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("username already exists".to_string()));
        }
        if self.users.values().any(|u| same_email(&u.email, &user.email)) {
            return Err(StoreError::Conflict("email already exists".to_string()));
        }
        Ok(())
    }

    fn ensure_key_unique(&self, token: &VerificationToken) -> Result<(), StoreError> {
        if self.tokens.values().any(|t| t.key == token.key) {
            return Err(StoreError::Conflict("verification key already exists".to_string()));
        }
        Ok(())
    }
}

/// In-memory store for tests/dev.
///
/// A single lock guards all tables, so multi-row operations
/// (`insert_user_with_token`, `redeem_and_activate`, `replace_pending_tokens`,
/// `update_record`) are atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[async_trait::async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.ensure_user_unique(user)?;
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn insert_user_with_token(&self, user: &User, token: &VerificationToken) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.ensure_user_unique(user)?;
        state.ensure_key_unique(token)?;
        state.users.insert(user.id, user.clone());
        state.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| same_email(&u.email, email))
            .cloned())
    }
}

#[async_trait::async_trait]
impl VerificationStore for InMemoryStore {
    async fn insert_token(&self, token: &VerificationToken) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.ensure_key_unique(token)?;
        state.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn replace_pending_tokens(
        &self,
        user_id: UserId,
        token: &VerificationToken,
    ) -> Result<u64, StoreError> {
        let mut state = self.write()?;
        state.ensure_key_unique(token)?;

        let mut closed = 0;
        for existing in state.tokens.values_mut() {
            if existing.user_id == user_id && existing.is_pending() {
                existing.close();
                closed += 1;
            }
        }
        state.tokens.insert(token.id, token.clone());
        Ok(closed)
    }

    async fn pending_token_by_key(
        &self,
        key: &VerificationKey,
    ) -> Result<Option<VerificationToken>, StoreError> {
        Ok(self
            .read()?
            .tokens
            .values()
            .find(|t| t.is_pending() && &t.key == key)
            .cloned())
    }

    async fn pending_tokens_for(&self, user_id: UserId) -> Result<Vec<VerificationToken>, StoreError> {
        let mut pending: Vec<VerificationToken> = self
            .read()?
            .tokens
            .values()
            .filter(|t| t.user_id == user_id && t.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(pending)
    }

    async fn redeem_and_activate(
        &self,
        token_id: TokenId,
        verified_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut state = self.write()?;
        let state = &mut *state;

        let Some(token) = state.tokens.get_mut(&token_id) else {
            return Ok(None);
        };
        if !token.is_pending() {
            return Ok(None);
        }
        // Check the owner before touching anything so a failure leaves both rows as they were.
        let Some(user) = state.users.get_mut(&token.user_id) else {
            return Err(StoreError::Backend(format!(
                "verification token {token_id} references a missing user"
            )));
        };

        token.mark_redeemed(verified_at);
        user.is_active = true;
        Ok(Some(user.clone()))
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_record(&self, record: &LedgerRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.records.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!("record {} already exists", record.id)));
        }
        state.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn record_by_id(&self, id: RecordId) -> Result<Option<LedgerRecord>, StoreError> {
        Ok(self.read()?.records.get(&id).cloned())
    }

    async fn update_record(
        &self,
        id: RecordId,
        patch: &RecordPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LedgerRecord>, StoreError> {
        let mut state = self.write()?;
        Ok(state.records.get_mut(&id).map(|existing| {
            patch.apply(existing, updated_at);
            existing.clone()
        }))
    }

    async fn delete_record(&self, id: RecordId) -> Result<bool, StoreError> {
        Ok(self.write()?.records.remove(&id).is_some())
    }

    async fn count_records(&self, query: RecordQuery) -> Result<u64, StoreError> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|r| query.matches(r))
            .count() as u64)
    }

    async fn list_records(
        &self,
        query: RecordQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LedgerRecord>, StoreError> {
        let mut matching: Vec<LedgerRecord> = self
            .read()?
            .records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        sort_newest_first(&mut matching);

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait::async_trait]
impl TokenBlacklist for InMemoryStore {
    async fn revoke(&self, jti: Uuid, _user_id: UserId, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write()?.revoked.entry(jti).or_insert(expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
        Ok(self.read()?.revoked.contains_key(&jti))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.write()?;
        let before = state.revoked.len();
        state.revoked.retain(|_, expires_at| *expires_at > now);
        Ok((before - state.revoked.len()) as u64)
    }
}
