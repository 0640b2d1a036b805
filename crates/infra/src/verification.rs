//! Verification token lifecycle on top of the store.
//!
//! Pure state rules live on `VerificationToken`; this type adds persistence,
//! the clock and logging.

use std::sync::Arc;

use tally_auth::{User, VerificationKey, VerificationToken};
use tally_core::{Clock, DomainError, UserId};
use tracing::{info, instrument, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::store::Store;

#[derive(Clone)]
pub struct VerificationManager {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl VerificationManager {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Persist a new account with its first pending token in one write.
    ///
    /// A failure leaves neither behind, so the registration can be retried.
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    pub async fn issue_for_new_user(&self, user: &User) -> ServiceResult<VerificationToken> {
        let token = VerificationToken::issue(user.id, self.clock.now());
        self.store.insert_user_with_token(user, &token).await?;
        info!(token_id = %token.id, expires_at = %token.expires_at(), "verification token issued");
        Ok(token)
    }

    /// Close every pending token of the user and issue a fresh one, atomically.
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    pub async fn reissue(&self, user: &User) -> ServiceResult<VerificationToken> {
        let token = VerificationToken::issue(user.id, self.clock.now());
        let closed = self.store.replace_pending_tokens(user.id, &token).await?;
        info!(token_id = %token.id, closed, "verification token reissued");
        Ok(token)
    }

    /// Redeem `key` and activate its owner.
    ///
    /// `NotFound` covers unknown, redeemed and closed keys alike. An expired
    /// token is refused and left pending.
    #[instrument(skip(self, key), err)]
    pub async fn redeem(&self, key: &VerificationKey) -> ServiceResult<User> {
        let now = self.clock.now();
        let Some(token) = self.store.pending_token_by_key(key).await? else {
            warn!("verification attempted with unknown or used key");
            return Err(DomainError::NotFound.into());
        };

        if let Err(err) = token.check_redeemable(now) {
            if err == DomainError::Expired {
                warn!(
                    token_id = %token.id,
                    user_id = %token.user_id,
                    expired_at = %token.expires_at(),
                    "verification attempted with expired token"
                );
            }
            return Err(err.into());
        }

        match self.store.redeem_and_activate(token.id, now).await? {
            Some(user) => {
                info!(token_id = %token.id, user_id = %user.id, "email verified; account activated");
                Ok(user)
            }
            // Lost a race against another redemption or a resend.
            None => Err(ServiceError::Domain(DomainError::NotFound)),
        }
    }

    pub async fn has_pending_for(&self, user_id: UserId) -> ServiceResult<bool> {
        Ok(self.latest_pending_for(user_id).await?.is_some())
    }

    /// Newest pending token of the user, if any.
    pub async fn latest_pending_for(&self, user_id: UserId) -> ServiceResult<Option<VerificationToken>> {
        Ok(self.store.pending_tokens_for(user_id).await?.into_iter().next())
    }
}
