use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tally_core::UserId;

/// Which half of a session token pair a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived, presented as `Authorization: Bearer`.
    Access,
    /// Longer-lived, only exchanged for access tokens; revocable.
    Refresh,
}

/// JWT claims model (transport-agnostic).
///
/// Timestamps serialize as numeric seconds so that standard JWT tooling can
/// read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    /// Access or refresh.
    pub token_type: TokenKind,

    /// Unique token id (the blacklist key for refresh tokens).
    pub jti: Uuid,

    /// Issued-at timestamp.
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl JwtClaims {
    pub fn new(sub: UserId, token_type: TokenKind, issued_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            sub,
            token_type,
            jti: Uuid::now_v7(),
            issued_at,
            expires_at: issued_at + ttl,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("wrong token type (expected {expected:?})")]
    WrongKind { expected: TokenKind },

    #[error("malformed or badly signed token: {0}")]
    Malformed(String),

    #[error("token has been revoked")]
    Revoked,
}

/// Deterministically validate JWT claims.
///
/// Signature verification / decoding happens in [`crate::jwt`]; this only
/// checks the time window and the token kind.
pub fn validate_claims(
    claims: &JwtClaims,
    expected: TokenKind,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.token_type != expected {
        return Err(TokenValidationError::WrongKind { expected });
    }
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    // One second of slack: `iat` is truncated to whole seconds on the wire.
    if now + chrono::Duration::seconds(1) < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
