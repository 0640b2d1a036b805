//! Email verification tokens.
//!
//! A token is a bearer credential: whoever holds the key can activate the
//! owning account, so keys come from the OS CSPRNG and are single use.
//!
//! Lifecycle:
//!
//! ```text
//! issued (pending) ──redeem within window──▶ redeemed  (is_verified, verified_at set)
//!        │          ──resend──────────────▶ closed    (is_verified, verified_at unset)
//!        └──────────  window elapses ──────▶ expired   (stays pending, never redeemable)
//! ```

use chrono::{DateTime, Duration, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};

use tally_core::{DomainError, DomainResult, TokenId, UserId};

/// How long a token stays redeemable after it was issued.
pub const VERIFICATION_WINDOW_MINUTES: i64 = 15;

/// Number of random bytes in a key (256 bits).
const KEY_BYTES: usize = 32;

pub fn verification_window() -> Duration {
    Duration::minutes(VERIFICATION_WINDOW_MINUTES)
}

/// Opaque verification key (lowercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationKey(String);

impl VerificationKey {
    /// Fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a key received from a client or read back from storage.
    pub fn from_string(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A verification token row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationToken {
    pub id: TokenId,
    pub user_id: UserId,
    pub key: VerificationKey,
    pub created_at: DateTime<Utc>,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

impl VerificationToken {
    /// Issue a new pending token for `user_id`.
    pub fn issue(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: TokenId::new(),
            user_id,
            key: VerificationKey::generate(),
            created_at: now,
            is_verified: false,
            verified_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.is_verified
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + verification_window()
    }

    /// Expired strictly after the window: a token is still good at exactly
    /// `created_at + 15min`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Decide whether this token may be redeemed at `now`.
    ///
    /// - non-pending tokens look exactly like unknown keys (`NotFound`)
    /// - pending tokens past their window are `Expired`
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_pending() {
            return Err(DomainError::NotFound);
        }
        if self.is_expired(now) {
            return Err(DomainError::Expired);
        }
        Ok(())
    }

    /// Mark as redeemed. Callers persist this together with user activation.
    pub fn mark_redeemed(&mut self, now: DateTime<Utc>) {
        self.is_verified = true;
        self.verified_at = Some(now);
    }

    /// Close without redeeming (superseded by a resend).
    pub fn close(&mut self) {
        self.is_verified = true;
    }
}
