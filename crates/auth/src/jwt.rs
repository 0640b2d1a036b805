//! HS256 JWT encoding/decoding.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use tally_core::UserId;

use crate::claims::{JwtClaims, TokenKind, TokenValidationError, validate_claims};

/// An access/refresh pair handed out at login.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Validates bearer tokens (used by the HTTP auth middleware).
pub trait JwtValidator: Send + Sync {
    /// Decode `token`, verify its signature, and check it is a valid `expected`
    /// token at `now`.
    fn validate(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<JwtClaims, TokenValidationError>;
}

/// Mints signed tokens.
pub trait JwtIssuer: Send + Sync {
    fn issue(&self, claims: &JwtClaims) -> Result<String, TokenValidationError>;
}

/// Symmetric HS256 codec with configured lifetimes.
pub struct Hs256Jwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl Hs256Jwt {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Claims for a fresh access token.
    pub fn access_claims(&self, sub: UserId, now: DateTime<Utc>) -> JwtClaims {
        JwtClaims::new(sub, TokenKind::Access, now, self.access_ttl)
    }

    /// Mint a login pair for `sub`.
    pub fn issue_pair(&self, sub: UserId, now: DateTime<Utc>) -> Result<TokenPair, TokenValidationError> {
        let refresh = JwtClaims::new(sub, TokenKind::Refresh, now, self.refresh_ttl);
        let access = self.access_claims(sub, now);
        Ok(TokenPair {
            access: self.issue(&access)?,
            refresh: self.issue(&refresh)?,
        })
    }
}

impl JwtIssuer for Hs256Jwt {
    fn issue(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))
    }
}

impl JwtValidator for Hs256Jwt {
    fn validate(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<JwtClaims, TokenValidationError> {
        // Time checks are done by `validate_claims` against the caller's clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;

        validate_claims(&data.claims, expected, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(secret: &str) -> Hs256Jwt {
        Hs256Jwt::new(secret.as_bytes(), Duration::minutes(5), Duration::days(1))
    }

    #[test]
    fn pair_validates_as_its_own_kind_only() {
        let jwt = codec("test-secret");
        let now = Utc::now();
        let user = UserId::new();
        let pair = jwt.issue_pair(user, now).unwrap();

        let access = jwt.validate(&pair.access, TokenKind::Access, now).unwrap();
        assert_eq!(access.sub, user);
        assert!(jwt.validate(&pair.access, TokenKind::Refresh, now).is_err());

        let refresh = jwt.validate(&pair.refresh, TokenKind::Refresh, now).unwrap();
        assert_ne!(refresh.jti, access.jti);
    }

    #[test]
    fn foreign_signature_rejected() {
        let now = Utc::now();
        let token = codec("one").issue_pair(UserId::new(), now).unwrap().access;
        let err = codec("two").validate(&token, TokenKind::Access, now).unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn access_token_expires_after_ttl() {
        let jwt = codec("test-secret");
        let now = Utc::now();
        let pair = jwt.issue_pair(UserId::new(), now).unwrap();
        let err = jwt
            .validate(&pair.access, TokenKind::Access, now + Duration::minutes(6))
            .unwrap_err();
        assert_eq!(err, TokenValidationError::Expired);
    }
}
