//! Client-supplied record fields and their validation.
//!
//! Only the fields below are ever read from a request; `id`, owner and
//! timestamps are assigned by the service and any such keys in the body are
//! ignored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use tally_core::{DomainResult, FieldErrorsBuilder, RecordId, UserId};

use crate::record::{LedgerRecord, TaxType, TransactionType};

pub const MAX_TITLE_LENGTH: usize = 255;
/// Total significant digits allowed for money fields.
pub const MAX_DIGITS: u32 = 10;
/// Decimal places allowed for money fields.
pub const DECIMAL_PLACES: u32 = 2;

/// Raw record fields as posted by a client (create or partial update).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordInput {
    #[serde(default)]
    pub title: Option<String>,
    /// `Some(None)` means "explicitly cleared" on update.
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub tax: Option<Decimal>,
    #[serde(default)]
    pub tax_type: Option<String>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// A validated record ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub tax: Decimal,
    pub tax_type: TaxType,
}

impl NewRecord {
    /// Validate a create request: `title`, `amount` and `transaction_type`
    /// are required; `tax` defaults to 0 and `tax_type` to flat.
    pub fn from_input(input: RecordInput) -> DomainResult<Self> {
        let mut errors = FieldErrorsBuilder::new();

        let title = match input.title {
            Some(t) => check_title(&t, &mut errors),
            None => {
                errors.add("title", "This field is required.");
                None
            }
        };
        let amount = match input.amount {
            Some(a) => check_money("amount", a, &mut errors),
            None => {
                errors.add("amount", "This field is required.");
                None
            }
        };
        let transaction_type = match input.transaction_type.as_deref() {
            Some(t) => check_transaction_type(t, &mut errors),
            None => {
                errors.add("transaction_type", "This field is required.");
                None
            }
        };
        let tax = match input.tax {
            Some(t) => check_money("tax", t, &mut errors),
            None => Some(Decimal::new(0, DECIMAL_PLACES)),
        };
        let tax_type = match input.tax_type.as_deref() {
            Some(t) => check_tax_type(t, &mut errors),
            None => Some(TaxType::default()),
        };
        let description = input.description.flatten().and_then(non_blank);

        errors.finish()?;

        match (title, amount, transaction_type, tax, tax_type) {
            (Some(title), Some(amount), Some(transaction_type), Some(tax), Some(tax_type)) => Ok(Self {
                title,
                description,
                amount,
                transaction_type,
                tax,
                tax_type,
            }),
            // Every `None` above recorded an error, so `finish` already returned.
            _ => Err(tally_core::DomainError::validation("incomplete record")),
        }
    }

    pub fn into_record(self, owner: UserId, now: DateTime<Utc>) -> LedgerRecord {
        LedgerRecord {
            id: RecordId::new(),
            owner,
            title: self.title,
            description: self.description,
            amount: self.amount,
            transaction_type: self.transaction_type,
            tax: self.tax,
            tax_type: self.tax_type,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A validated partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub amount: Option<Decimal>,
    pub transaction_type: Option<TransactionType>,
    pub tax: Option<Decimal>,
    pub tax_type: Option<TaxType>,
}

impl RecordPatch {
    pub fn from_input(input: RecordInput) -> DomainResult<Self> {
        let mut errors = FieldErrorsBuilder::new();

        let title = input.title.and_then(|t| check_title(&t, &mut errors));
        let amount = input.amount.and_then(|a| check_money("amount", a, &mut errors));
        let transaction_type = input
            .transaction_type
            .as_deref()
            .and_then(|t| check_transaction_type(t, &mut errors));
        let tax = input.tax.and_then(|t| check_money("tax", t, &mut errors));
        let tax_type = input.tax_type.as_deref().and_then(|t| check_tax_type(t, &mut errors));
        let description = input.description.map(|d| d.and_then(non_blank));

        errors.finish()?;

        Ok(Self {
            title,
            description,
            amount,
            transaction_type,
            tax,
            tax_type,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply supplied fields to `record` and bump `updated_at`.
    pub fn apply(&self, record: &mut LedgerRecord, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(amount) = self.amount {
            record.amount = amount;
        }
        if let Some(transaction_type) = self.transaction_type {
            record.transaction_type = transaction_type;
        }
        if let Some(tax) = self.tax {
            record.tax = tax;
        }
        if let Some(tax_type) = self.tax_type {
            record.tax_type = tax_type;
        }
        record.updated_at = now;
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

fn check_title(title: &str, errors: &mut FieldErrorsBuilder) -> Option<String> {
    let title = title.trim();
    if title.is_empty() {
        errors.add("title", "This field may not be blank.");
        return None;
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        errors.add(
            "title",
            format!("Ensure this field has no more than {MAX_TITLE_LENGTH} characters."),
        );
        return None;
    }
    Some(title.to_string())
}

/// Non-negative, at most 2 decimal places and 10 digits overall. Returned
/// value is rescaled to exactly 2 decimal places.
fn check_money(field: &str, value: Decimal, errors: &mut FieldErrorsBuilder) -> Option<Decimal> {
    if value.is_sign_negative() && !value.is_zero() {
        errors.add(field, "Ensure this value is greater than or equal to 0.");
        return None;
    }
    let normalized = value.normalize();
    if normalized.scale() > DECIMAL_PLACES {
        errors.add(
            field,
            format!("Ensure that there are no more than {DECIMAL_PLACES} decimal places."),
        );
        return None;
    }
    let max_whole = Decimal::from(10i64.pow(MAX_DIGITS - DECIMAL_PLACES));
    if normalized.trunc() >= max_whole {
        errors.add(
            field,
            format!("Ensure that there are no more than {MAX_DIGITS} digits in total."),
        );
        return None;
    }
    let mut money = normalized.abs();
    money.rescale(DECIMAL_PLACES);
    Some(money)
}

fn check_transaction_type(value: &str, errors: &mut FieldErrorsBuilder) -> Option<TransactionType> {
    match value.parse::<TransactionType>() {
        Ok(t) => Some(t),
        Err(_) => {
            errors.add("transaction_type", format!("\"{value}\" is not a valid choice."));
            None
        }
    }
}

fn check_tax_type(value: &str, errors: &mut FieldErrorsBuilder) -> Option<TaxType> {
    match value.parse::<TaxType>() {
        Ok(t) => Some(t),
        Err(_) => {
            errors.add("tax_type", format!("\"{value}\" is not a valid choice."));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::DomainError;

    fn input(json: &str) -> RecordInput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn create_applies_defaults_and_ignores_owner_fields() {
        let rec = NewRecord::from_input(input(
            r#"{"title":"Salary","amount":"2500","transaction_type":"credit","user":42,"id":7}"#,
        ))
        .unwrap();
        assert_eq!(rec.tax, Decimal::ZERO);
        assert_eq!(rec.tax_type, TaxType::Flat);
        assert_eq!(rec.amount.to_string(), "2500.00");
    }

    #[test]
    fn create_reports_every_missing_field() {
        let DomainError::InvalidFields(fields) = NewRecord::from_input(input("{}")).unwrap_err() else {
            panic!("expected field errors");
        };
        assert_eq!(
            fields.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["amount", "title", "transaction_type"]
        );
    }

    #[test]
    fn money_rules() {
        let err = NewRecord::from_input(input(
            r#"{"title":"x","amount":"-1","transaction_type":"debit","tax":"1.234"}"#,
        ))
        .unwrap_err();
        let DomainError::InvalidFields(fields) = err else { panic!() };
        assert!(fields["amount"][0].contains("greater than or equal to 0"));
        assert!(fields["tax"][0].contains("decimal places"));

        let err = NewRecord::from_input(input(
            r#"{"title":"x","amount":"100000000","transaction_type":"debit"}"#,
        ))
        .unwrap_err();
        let DomainError::InvalidFields(fields) = err else { panic!() };
        assert!(fields["amount"][0].contains("10 digits"));
    }

    #[test]
    fn patch_touches_only_supplied_fields() {
        let now = Utc::now();
        let mut record = NewRecord::from_input(input(
            r#"{"title":"Rent","description":"May","amount":"900","transaction_type":"debit"}"#,
        ))
        .unwrap()
        .into_record(UserId::new(), now);
        let before = record.clone();

        let later = now + chrono::Duration::minutes(1);
        let patch = RecordPatch::from_input(input(r#"{"amount":"950.5","description":null}"#)).unwrap();
        patch.apply(&mut record, later);

        assert_eq!(record.amount.to_string(), "950.50");
        assert_eq!(record.description, None);
        assert_eq!(record.title, before.title);
        assert_eq!(record.owner, before.owner);
        assert_eq!(record.created_at, before.created_at);
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn patch_rejects_bad_choice() {
        let err = RecordPatch::from_input(input(r#"{"transaction_type":"refund"}"#)).unwrap_err();
        let DomainError::InvalidFields(fields) = err else { panic!() };
        assert_eq!(fields["transaction_type"], vec!["\"refund\" is not a valid choice.".to_string()]);
    }
}
