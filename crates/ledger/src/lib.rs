//! Ledger module: personal expense/income records.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod input;
pub mod page;
pub mod record;

pub use input::{NewRecord, RecordInput, RecordPatch};
pub use page::{Page, PageRequest, PageWindow};
pub use record::{LedgerRecord, TaxType, TransactionType, sort_newest_first};

/// Upper bound on `ListByType` results.
pub const BY_TYPE_LIMIT: usize = 20;
