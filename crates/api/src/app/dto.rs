use serde::Deserialize;
use serde_json::json;

use tally_auth::UserProfile;
use tally_infra::ConfirmedAccount;
use tally_ledger::LedgerRecord;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default, alias = "refresh")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TypeQuery {
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn profile_to_json(profile: &UserProfile) -> serde_json::Value {
    json!({
        "id": profile.id.to_string(),
        "username": profile.username,
        "email": profile.email,
        "first_name": profile.first_name,
        "last_name": profile.last_name,
        "is_superuser": profile.is_superuser,
    })
}

pub fn confirmed_to_json(account: &ConfirmedAccount) -> serde_json::Value {
    json!({
        "username": account.username,
        "email": account.email,
        "is_active": account.is_active,
    })
}

/// Full record, as returned by get/create/update.
pub fn record_to_json(record: &LedgerRecord) -> serde_json::Value {
    json!({
        "id": record.id.to_string(),
        "title": record.title,
        "description": record.description,
        "amount": record.amount.to_string(),
        "transaction_type": record.transaction_type.as_str(),
        "tax": record.tax.to_string(),
        "tax_type": record.tax_type.as_str(),
        "total": record.total().to_string(),
        "created_at": record.created_at.to_rfc3339(),
        "updated_at": record.updated_at.to_rfc3339(),
    })
}

/// Compact record, as returned by listings.
pub fn record_summary_to_json(record: &LedgerRecord) -> serde_json::Value {
    json!({
        "id": record.id.to_string(),
        "title": record.title,
        "amount": record.amount.to_string(),
        "transaction_type": record.transaction_type.as_str(),
        "total": record.total().to_string(),
        "created_at": record.created_at.to_rfc3339(),
    })
}

/// Merge `extra` into a JSON object.
pub fn with_fields(mut value: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    if let (Some(target), serde_json::Value::Object(extra)) = (value.as_object_mut(), extra) {
        target.extend(extra);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_core::UserId;
    use tally_ledger::{NewRecord, RecordInput};

    fn record() -> LedgerRecord {
        let input: RecordInput = serde_json::from_value(json!({
            "title": "Groceries",
            "amount": "100",
            "transaction_type": "debit",
            "tax": "10",
            "tax_type": "percentage",
        }))
        .unwrap();
        NewRecord::from_input(input).unwrap().into_record(UserId::new(), Utc::now())
    }

    #[test]
    fn detail_has_money_as_two_decimal_strings() {
        let json = record_to_json(&record());
        assert_eq!(json["amount"], "100.00");
        assert_eq!(json["tax"], "10.00");
        assert_eq!(json["total"], "110.00");
        assert_eq!(json["tax_type"], "percentage");
        assert!(json["description"].is_null());
    }

    #[test]
    fn summary_omits_detail_fields() {
        let json = record_summary_to_json(&record());
        assert!(json.get("description").is_none());
        assert!(json.get("updated_at").is_none());
        assert_eq!(json["total"], "110.00");
    }

    #[test]
    fn with_fields_merges() {
        let merged = with_fields(json!({"a": 1}), json!({"message": "ok"}));
        assert_eq!(merged, json!({"a": 1, "message": "ok"}));
    }
}
