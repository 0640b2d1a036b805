//! Account lifecycle: registration, email verification, sessions, profile.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, instrument, warn};

use tally_auth::{
    Hs256Jwt, JwtIssuer, JwtValidator, Principal, Registration, TokenKind, TokenPair, User, UserProfile,
    VerificationKey, VerificationToken, hash_password, normalize_email, validate_email, validate_registration,
    verify_against_dummy, verify_password,
};
use tally_core::{Clock, DomainError, FieldErrors, UserId};

use crate::config::{AppConfig, SuperuserBootstrap};
use crate::error::{ServiceError, ServiceResult};
use crate::notify::{VerificationNotifier, confirmation_link};
use crate::store::Store;
use crate::verification::VerificationManager;

pub const INVALID_CREDENTIALS: &str = "Invalid username or password.";
pub const UNVERIFIED_LOGIN: &str = "Please verify your email address before logging in.";
pub const MISSING_CREDENTIALS: &str = "Must include username and password.";
pub const REFRESH_TOKEN_REQUIRED: &str = "Refresh token required";
pub const NO_PENDING_VERIFICATION: &str = "No pending verification found for this email.";

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

/// Result of a successful email confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedAccount {
    pub username: String,
    pub email: String,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn VerificationNotifier>,
    jwt: Arc<Hs256Jwt>,
    clock: Arc<dyn Clock>,
    verification: VerificationManager,
    public_base_url: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn VerificationNotifier>,
        jwt: Arc<Hs256Jwt>,
        clock: Arc<dyn Clock>,
        public_base_url: impl Into<String>,
    ) -> Self {
        let verification = VerificationManager::new(store.clone(), clock.clone());
        Self {
            store,
            notifier,
            jwt,
            clock,
            verification,
            public_base_url: public_base_url.into(),
        }
    }

    /// Wire a service from configuration.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn VerificationNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let jwt = Hs256Jwt::new(
            config.jwt_secret.as_bytes(),
            Duration::minutes(config.access_ttl_minutes),
            Duration::minutes(config.refresh_ttl_minutes),
        );
        Self::new(store, notifier, Arc::new(jwt), clock, config.public_base_url.clone())
    }

    pub fn verification(&self) -> &VerificationManager {
        &self.verification
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration & verification
    // ─────────────────────────────────────────────────────────────────────

    /// Create an inactive account and announce its first verification link.
    #[instrument(skip(self, registration), fields(username = %registration.username), err)]
    pub async fn register(&self, registration: Registration) -> ServiceResult<UserProfile> {
        let mut fields = stateless_field_errors(validate_registration(&registration))?;

        let email = registration.normalized_email();
        if self.store.user_by_username(&registration.username).await?.is_some() {
            push_field(&mut fields, "username", "A user with that username already exists.");
        }
        if self.store.user_by_email(&email).await?.is_some() {
            push_field(&mut fields, "email", "A user with this email already exists.");
        }
        if !fields.is_empty() {
            return Err(DomainError::InvalidFields(fields).into());
        }

        let password_hash = hash_blocking(registration.password).await?;
        let user = User::new_inactive(
            registration.username,
            email,
            password_hash,
            registration.first_name.unwrap_or_default(),
            registration.last_name.unwrap_or_default(),
            self.clock.now(),
        );
        let token = self.verification.issue_for_new_user(&user).await?;
        info!(user_id = %user.id, "user registered");
        self.announce(&user, &token).await;
        Ok(user.profile())
    }

    /// Re-send the link of the newest pending token. The token keeps its
    /// original expiry.
    #[instrument(skip(self, email), err)]
    pub async fn request_verification(&self, email: &str) -> ServiceResult<String> {
        let user = self.unverified_user_by_email(email).await?;
        let Some(token) = self.verification.latest_pending_for(user.id).await? else {
            return Err(ServiceError::validation(NO_PENDING_VERIFICATION));
        };
        self.announce(&user, &token).await;
        Ok(email.trim().to_string())
    }

    /// Close all pending tokens and announce a fresh one.
    #[instrument(skip(self, email), err)]
    pub async fn resend_verification(&self, email: &str) -> ServiceResult<String> {
        let user = self.unverified_user_by_email(email).await?;
        let token = self.verification.reissue(&user).await?;
        self.announce(&user, &token).await;
        Ok(email.trim().to_string())
    }

    /// Redeem a verification key.
    #[instrument(skip(self, key), err)]
    pub async fn confirm(&self, key: &str) -> ServiceResult<ConfirmedAccount> {
        let user = self.verification.redeem(&VerificationKey::from_string(key)).await?;
        Ok(ConfirmedAccount {
            username: user.username,
            email: user.email,
            is_active: user.is_active,
        })
    }

    async fn unverified_user_by_email(&self, email: &str) -> ServiceResult<User> {
        if let Err(msg) = validate_email(email) {
            return Err(DomainError::field("email", msg).into());
        }
        let user = self
            .store
            .user_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| DomainError::field("email", "User with this email does not exist."))?;
        if user.is_active {
            return Err(DomainError::field("email", "Email is already verified.").into());
        }
        Ok(user)
    }

    async fn announce(&self, user: &User, token: &VerificationToken) {
        let link = confirmation_link(&self.public_base_url, token.key.as_str());
        if let Err(err) = self.notifier.announce(user, &link).await {
            // The user can always ask for a resend.
            warn!(user_id = %user.id, error = %err, "verification notifier failed");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, password), err)]
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<LoginOutcome> {
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::validation(MISSING_CREDENTIALS));
        }

        let Some(user) = self.store.user_by_username(username).await? else {
            // Same Argon2 cost as a real account.
            let password = password.to_string();
            tokio::task::spawn_blocking(move || verify_against_dummy(&password))
                .await
                .map_err(|e| ServiceError::internal(format!("verification task failed: {e}")))?;
            warn!("login failed: unknown username");
            return Err(ServiceError::validation(INVALID_CREDENTIALS));
        };
        if !verify_blocking(password.to_string(), user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "login failed: bad password");
            return Err(ServiceError::validation(INVALID_CREDENTIALS));
        }
        if !user.is_active {
            warn!(user_id = %user.id, "login refused: email not verified");
            return Err(ServiceError::validation(UNVERIFIED_LOGIN));
        }

        let tokens = self
            .jwt
            .issue_pair(user.id, self.clock.now())
            .map_err(|e| ServiceError::internal(e.to_string()))?;
        info!(user_id = %user.id, "login succeeded");
        Ok(LoginOutcome {
            user: user.profile(),
            tokens,
        })
    }

    /// Exchange a refresh token for a new access token.
    #[instrument(skip(self, refresh_token), err)]
    pub async fn refresh(&self, refresh_token: &str) -> ServiceResult<String> {
        let now = self.clock.now();
        let claims = self
            .jwt
            .validate(refresh_token, TokenKind::Refresh, now)
            .map_err(|e| ServiceError::authentication(e.to_string()))?;
        if self.store.is_revoked(claims.jti).await? {
            return Err(ServiceError::authentication("token has been revoked"));
        }
        self.active_user(claims.sub).await?;

        self.jwt
            .issue(&self.jwt.access_claims(claims.sub, now))
            .map_err(|e| ServiceError::internal(e.to_string()))
    }

    /// Blacklist the caller's refresh token.
    #[instrument(skip(self, refresh_token), fields(user_id = %principal.user_id), err)]
    pub async fn logout(&self, principal: &Principal, refresh_token: Option<&str>) -> ServiceResult<()> {
        let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) else {
            return Err(ServiceError::validation(REFRESH_TOKEN_REQUIRED));
        };

        let claims = match self.jwt.validate(refresh_token, TokenKind::Refresh, self.clock.now()) {
            Ok(claims) => claims,
            Err(err) => {
                warn!(error = %err, "logout with unusable refresh token");
                return Err(DomainError::InvalidToken.into());
            }
        };
        if claims.sub != principal.user_id {
            warn!(token_sub = %claims.sub, "logout with another user's refresh token");
            return Err(DomainError::InvalidToken.into());
        }

        let revoked = match self.store.is_revoked(claims.jti).await {
            Ok(false) => self.store.revoke(claims.jti, claims.sub, claims.expires_at).await,
            Ok(true) => return Err(DomainError::InvalidToken.into()),
            Err(err) => Err(err),
        };
        if let Err(err) = revoked {
            warn!(error = %err, "failed to blacklist refresh token");
            return Err(DomainError::InvalidToken.into());
        }

        info!(jti = %claims.jti, "logout; refresh token blacklisted");

        match self.store.purge_expired(self.clock.now()).await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "expired revocations purged"),
            Err(err) => warn!(error = %err, "failed to purge expired revocations"),
        }
        Ok(())
    }

    /// Resolve a bearer access token to a principal.
    ///
    /// The user is re-read on every call so deactivation and superuser
    /// changes apply immediately.
    pub async fn authenticate(&self, access_token: &str) -> ServiceResult<Principal> {
        let claims = self
            .jwt
            .validate(access_token, TokenKind::Access, self.clock.now())
            .map_err(|e| ServiceError::authentication(e.to_string()))?;
        let user = self.active_user(claims.sub).await?;
        Ok(Principal::from(&user))
    }

    pub async fn profile(&self, principal: &Principal) -> ServiceResult<UserProfile> {
        Ok(self.active_user(principal.user_id).await?.profile())
    }

    async fn active_user(&self, id: UserId) -> ServiceResult<User> {
        match self.store.user_by_id(id).await? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(ServiceError::authentication("user is inactive")),
            None => Err(ServiceError::authentication("user not found")),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bootstrap
    // ─────────────────────────────────────────────────────────────────────

    /// Create the configured superuser if no account has its username.
    ///
    /// An existing account is left untouched.
    #[instrument(skip(self, bootstrap), fields(username = %bootstrap.username), err)]
    pub async fn ensure_superuser(&self, bootstrap: &SuperuserBootstrap) -> ServiceResult<UserProfile> {
        if let Some(existing) = self.store.user_by_username(&bootstrap.username).await? {
            if !existing.is_superuser {
                warn!(user_id = %existing.id, "bootstrap username belongs to a regular user; not promoting");
            }
            return Ok(existing.profile());
        }

        if let Err(msg) = validate_email(&bootstrap.email) {
            return Err(DomainError::field("email", msg).into());
        }
        let password_hash = hash_blocking(bootstrap.password.clone()).await?;
        let mut user = User::new_inactive(
            bootstrap.username.clone(),
            normalize_email(&bootstrap.email),
            password_hash,
            "",
            "",
            self.clock.now(),
        );
        user.is_active = true;
        user.is_superuser = true;
        self.store.insert_user(&user).await?;
        info!(user_id = %user.id, "superuser created");
        Ok(user.profile())
    }
}

fn stateless_field_errors(result: Result<(), DomainError>) -> ServiceResult<FieldErrors> {
    match result {
        Ok(()) => Ok(FieldErrors::new()),
        Err(DomainError::InvalidFields(fields)) => Ok(fields),
        Err(other) => Err(other.into()),
    }
}

fn push_field(fields: &mut FieldErrors, field: &str, msg: &str) {
    fields.entry(field.to_string()).or_default().push(msg.to_string());
}

async fn hash_blocking(password: String) -> ServiceResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::internal(format!("hashing task failed: {e}")))?
        .map_err(|e| ServiceError::internal(e.to_string()))
}

async fn verify_blocking(password: String, stored: String) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ServiceError::internal(format!("verification task failed: {e}")))
}
