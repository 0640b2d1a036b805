use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use tally_core::RecordId;
use tally_ledger::{PageRequest, RecordInput};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::PageQuery>,
) -> axum::response::Response {
    let request = match PageRequest::parse(query.page.as_deref(), query.page_size.as_deref()) {
        Ok(r) => r,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.ledger.list(principal.principal(), request).await {
        Ok(page) => {
            let page = page.map(|r| dto::record_summary_to_json(&r));
            (StatusCode::OK, Json(page)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<RecordInput>, JsonRejection>,
) -> axum::response::Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.ledger.create(principal.principal(), input).await {
        Ok(record) => (
            StatusCode::CREATED,
            Json(dto::with_fields(
                dto::record_to_json(&record),
                json!({ "message": "Expense/Income created successfully" }),
            )),
        )
            .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_by_id(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.ledger.get(principal.principal(), id).await {
        Ok(record) => (StatusCode::OK, Json(dto::record_to_json(&record))).into_response(),
        Err(e) => errors::record_error_to_response(e),
    }
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<RecordInput>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let Json(input) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.ledger.update(principal.principal(), id, input).await {
        Ok(record) => (
            StatusCode::OK,
            Json(dto::with_fields(
                dto::record_to_json(&record),
                json!({ "message": "Expense/Income updated successfully" }),
            )),
        )
            .into_response(),
        Err(e) => errors::record_error_to_response(e),
    }
}

pub async fn remove(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.ledger.delete(principal.principal(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::record_error_to_response(e),
    }
}

pub async fn by_type(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::TypeQuery>,
) -> axum::response::Response {
    match services
        .ledger
        .list_by_type(principal.principal(), query.transaction_type.as_deref())
        .await
    {
        Ok(records) => {
            let items = records.iter().map(dto::record_summary_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(items)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

fn parse_id(raw: &str) -> Result<RecordId, axum::response::Response> {
    raw.parse::<RecordId>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid record id"))
}
