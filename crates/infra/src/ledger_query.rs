//! Ownership-scoped access to ledger records.
//!
//! Every single-record operation loads the record and runs it through
//! `authorize_record`; a denial is reported as `NotFound`, exactly like a
//! missing id.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use tally_auth::{Principal, RecordScope, authorize_record};
use tally_core::{Clock, DomainError, RecordId};
use tally_ledger::{BY_TYPE_LIMIT, LedgerRecord, NewRecord, Page, PageRequest, RecordInput, RecordPatch, TransactionType};

use crate::error::ServiceResult;
use crate::store::{RecordQuery, Store};

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// One page of the principal's scope, newest first.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn list(&self, principal: &Principal, request: PageRequest) -> ServiceResult<Page<LedgerRecord>> {
        let query = RecordQuery::new(RecordScope::for_principal(principal));
        let count = self.store.count_records(query).await?;
        let window = request.window(count)?;
        let results = self.store.list_records(query, window.offset, window.limit).await?;
        Ok(Page::new(count, &window, results))
    }

    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create(&self, principal: &Principal, input: RecordInput) -> ServiceResult<LedgerRecord> {
        let record = NewRecord::from_input(input)?.into_record(principal.user_id, self.clock.now());
        self.store.insert_record(&record).await?;
        info!(record_id = %record.id, "ledger record created");
        Ok(record)
    }

    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn get(&self, principal: &Principal, id: RecordId) -> ServiceResult<LedgerRecord> {
        self.load_authorized(principal, id).await
    }

    /// Partial update: only supplied fields change, `updated_at` is bumped.
    ///
    /// The patch is applied by the store to the current row, so concurrent
    /// updates of different fields both survive.
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn update(&self, principal: &Principal, id: RecordId, input: RecordInput) -> ServiceResult<LedgerRecord> {
        self.load_authorized(principal, id).await?;
        let patch = RecordPatch::from_input(input)?;

        let record = self
            .store
            .update_record(id, &patch, self.clock.now())
            .await?
            .ok_or(DomainError::NotFound)?;
        info!(record_id = %record.id, "ledger record updated");
        Ok(record)
    }

    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn delete(&self, principal: &Principal, id: RecordId) -> ServiceResult<()> {
        self.load_authorized(principal, id).await?;
        if !self.store.delete_record(id).await? {
            return Err(DomainError::NotFound.into());
        }
        info!(record_id = %id, "ledger record deleted");
        Ok(())
    }

    /// Up to [`BY_TYPE_LIMIT`] records of the given type (or of any type when
    /// `raw_type` is absent or empty), newest first.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn list_by_type(&self, principal: &Principal, raw_type: Option<&str>) -> ServiceResult<Vec<LedgerRecord>> {
        let transaction_type = match raw_type.filter(|t| !t.is_empty()) {
            Some(raw) => Some(raw.parse::<TransactionType>()?),
            None => None,
        };
        let query = RecordQuery::new(RecordScope::for_principal(principal)).with_type(transaction_type);
        Ok(self.store.list_records(query, 0, BY_TYPE_LIMIT as u64).await?)
    }

    async fn load_authorized(&self, principal: &Principal, id: RecordId) -> ServiceResult<LedgerRecord> {
        let record = self.store.record_by_id(id).await?.ok_or(DomainError::NotFound)?;
        if let Err(denied) = authorize_record(principal, record.owner) {
            debug!(record_id = %id, error = %denied, "record access denied");
            return Err(DomainError::from(denied).into());
        }
        Ok(record)
    }
}
