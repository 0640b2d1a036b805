use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use tally_core::{DomainError, FieldErrors};
use tally_infra::ServiceError;

pub const RECORD_NOT_FOUND: &str = "Expense/Income record not found";

pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Authentication(detail) => {
            tracing::debug!(%detail, "authentication failed");
            json_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Given token not valid for any token type",
            )
        }
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            internal_error()
        }
        ServiceError::Internal(msg) => {
            tracing::error!(error = %msg, "internal failure");
            internal_error()
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidFields(fields) => fields_error(fields),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "Not found."),
        DomainError::Expired => json_error(StatusCode::BAD_REQUEST, "expired", "expired"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::InvalidToken => json_error(StatusCode::BAD_REQUEST, "invalid_token", "Invalid token"),
        DomainError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized"),
    }
}

/// Record-scoped variant: not-found carries the record message.
pub fn record_error_to_response(err: ServiceError) -> axum::response::Response {
    match err.domain() {
        Some(DomainError::NotFound) => json_error(StatusCode::NOT_FOUND, "not_found", RECORD_NOT_FOUND),
        _ => service_error_to_response(err),
    }
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_json", rejection.body_text())
}

pub fn fields_error(fields: FieldErrors) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "validation_error",
            "message": "Invalid input.",
            "fields": fields,
        })),
    )
        .into_response()
}

fn internal_error() -> axum::response::Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
