use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use tally_auth::Registration;
use tally_core::DomainError;
use tally_infra::accounts::REFRESH_TOKEN_REQUIRED;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Registration>, JsonRejection>,
) -> axum::response::Response {
    let Json(registration) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.auth.register(registration).await {
        Ok(profile) => (
            StatusCode::CREATED,
            Json(json!({
                "user": dto::profile_to_json(&profile),
                "message": "User registered successfully. Please follow the verification link to activate your account.",
                "verification_required": true,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::LoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.auth.login(&body.username, &body.password).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "user": dto::profile_to_json(&outcome.user),
                "tokens": {
                    "access": outcome.tokens.access,
                    "refresh": outcome.tokens.refresh,
                },
                "message": "Login successful",
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    body: Option<Json<dto::RefreshRequest>>,
) -> axum::response::Response {
    let token = body.and_then(|Json(b)| b.refresh).filter(|t| !t.is_empty());
    let Some(token) = token else {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", REFRESH_TOKEN_REQUIRED);
    };

    match services.auth.refresh(&token).await {
        Ok(access) => (StatusCode::OK, Json(json!({ "access": access }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Option<Json<dto::LogoutRequest>>,
) -> axum::response::Response {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    match services
        .auth
        .logout(principal.principal(), body.refresh_token.as_deref())
        .await
    {
        Ok(()) => (StatusCode::OK, Json(json!({ "message": "Logout successful" }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.auth.profile(principal.principal()).await {
        Ok(profile) => (StatusCode::OK, Json(dto::profile_to_json(&profile))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn verify_email(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::EmailRequest>, JsonRejection>,
) -> axum::response::Response {
    let email = match required_email(body) {
        Ok(email) => email,
        Err(res) => return res,
    };

    match services.auth.request_verification(&email).await {
        Ok(email) => (
            StatusCode::OK,
            Json(json!({
                "message": "Verification email sent. Please follow the verification link.",
                "email": email,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn resend_email(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::EmailRequest>, JsonRejection>,
) -> axum::response::Response {
    let email = match required_email(body) {
        Ok(email) => email,
        Err(res) => return res,
    };

    match services.auth.resend_verification(&email).await {
        Ok(email) => (
            StatusCode::OK,
            Json(json!({
                "message": "New verification email sent. Please follow the new verification link.",
                "email": email,
            })),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn confirm_email(
    Extension(services): Extension<Arc<AppServices>>,
    Path(key): Path<String>,
) -> axum::response::Response {
    match services.auth.confirm(&key).await {
        Ok(account) => (
            StatusCode::OK,
            Json(json!({
                "message": "Email verified successfully! You can now log in.",
                "user": dto::confirmed_to_json(&account),
            })),
        )
            .into_response(),
        Err(e) => match e.domain() {
            Some(DomainError::NotFound) => errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_link",
                "Invalid or already used verification link.",
            ),
            Some(DomainError::Expired) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "expired_link",
                    "message": "Verification link has expired. Please request a new one.",
                    "expired": true,
                })),
            )
                .into_response(),
            _ => errors::service_error_to_response(e),
        },
    }
}

pub async fn verification_sent() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "message": "Email verification has been sent. Please follow the verification link.",
            "instructions": "Click on the verification link to activate your account.",
        })),
    )
}

fn required_email(body: Result<Json<dto::EmailRequest>, JsonRejection>) -> Result<String, axum::response::Response> {
    let Json(body) = body.map_err(errors::json_rejection)?;
    match body.email.filter(|e| !e.trim().is_empty()) {
        Some(email) => Ok(email),
        None => Err(errors::domain_error_to_response(DomainError::field(
            "email",
            "This field is required.",
        ))),
    }
}
