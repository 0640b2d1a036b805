//! `tally-auth`: accounts, credentials, verification tokens and the record
//! authorization policy.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod principal;
pub mod user;
pub mod verification;

pub use authorize::{AuthzError, RecordScope, authorize_record};
pub use claims::{JwtClaims, TokenKind, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtIssuer, JwtValidator, TokenPair};
pub use password::{
    PasswordHashError, check_password_policy, hash_password, verify_against_dummy, verify_password,
};
pub use principal::Principal;
pub use user::{
    MAX_EMAIL_LENGTH, MAX_NAME_LENGTH, Registration, User, UserProfile, normalize_email, validate_email,
    validate_registration,
};
pub use verification::{VERIFICATION_WINDOW_MINUTES, VerificationKey, VerificationToken};
