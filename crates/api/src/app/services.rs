//! Store/notifier/service wiring.

use std::sync::Arc;

use tally_core::{Clock, SystemClock};
use tally_infra::{
    AppConfig, AuthService, ConsoleNotifier, InMemoryStore, LedgerService, LogNotifier, NotifierKind, PostgresStore,
    Store, StoreError, VerificationNotifier,
};

/// Application services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub auth: AuthService,
    pub ledger: LedgerService,
}

impl AppServices {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn VerificationNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            auth: AuthService::from_config(config, store.clone(), notifier, clock.clone()),
            ledger: LedgerService::new(store, clock),
        }
    }

    /// In-memory store with the given notifier (dev/tests).
    pub fn in_memory(config: &AppConfig, notifier: Arc<dyn VerificationNotifier>) -> Self {
        Self::new(config, Arc::new(InMemoryStore::new()), notifier, Arc::new(SystemClock))
    }
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let notifier: Arc<dyn VerificationNotifier> = match config.notifier {
        NotifierKind::Console => Arc::new(ConsoleNotifier),
        NotifierKind::Log => Arc::new(LogNotifier),
    };

    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.db_max_connections).await?;
            tracing::info!("using persistent stores (postgres)");
            Ok(AppServices::new(config, Arc::new(store), notifier, Arc::new(SystemClock)))
        }
        None => {
            tracing::info!("using in-memory stores");
            Ok(AppServices::in_memory(config, notifier))
        }
    }
}
