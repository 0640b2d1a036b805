use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use tally_core::{DomainError, RecordId, UserId};

/// Direction of money flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Income.
    Credit,
    /// Expense.
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(TransactionType::Credit),
            "debit" => Ok(TransactionType::Debit),
            _ => Err(DomainError::validation("Invalid transaction type specified")),
        }
    }
}

/// How `tax` combines with `amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxType {
    /// `tax` is an absolute amount added on top.
    #[default]
    #[serde(alias = "fixed")]
    Flat,
    /// `tax` is a percentage of `amount`.
    Percentage,
}

impl TaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxType::Flat => "flat",
            TaxType::Percentage => "percentage",
        }
    }
}

impl FromStr for TaxType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" | "fixed" => Ok(TaxType::Flat),
            "percentage" => Ok(TaxType::Percentage),
            other => Err(DomainError::field("tax_type", format!("\"{other}\" is not a valid choice."))),
        }
    }
}

/// An expense or income entry, owned by exactly one user.
///
/// `total` is never stored: it is derived from `amount`, `tax` and `tax_type`
/// every time it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub id: RecordId,
    pub owner: UserId,
    pub title: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub tax: Decimal,
    pub tax_type: TaxType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerRecord {
    /// Amount with tax applied, rounded to cents (midpoint away from zero).
    ///
    /// - `flat`: `amount + tax`
    /// - `percentage`: `amount * (1 + tax / 100)`
    pub fn total(&self) -> Decimal {
        compute_total(self.amount, self.tax, self.tax_type)
    }
}

pub fn compute_total(amount: Decimal, tax: Decimal, tax_type: TaxType) -> Decimal {
    let raw = match tax_type {
        TaxType::Flat => amount + tax,
        TaxType::Percentage => amount + amount * tax / Decimal::ONE_HUNDRED,
    };
    let mut total = raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    total.rescale(2);
    total
}

/// Newest first; ties broken by id (UUIDv7, so also creation order).
pub fn sort_newest_first(records: &mut [LedgerRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}
