//! Infrastructure layer: stores, notifiers, config and the application
//! services built on top of them.

pub mod accounts;
pub mod config;
pub mod error;
pub mod ledger_query;
pub mod notify;
pub mod store;
pub mod verification;

#[cfg(test)]
mod integration_tests;

pub use accounts::{AuthService, ConfirmedAccount, LoginOutcome};
pub use config::{AppConfig, ConfigError, NotifierKind, SuperuserBootstrap};
pub use error::{ServiceError, ServiceResult};
pub use ledger_query::LedgerService;
pub use notify::{ConsoleNotifier, LogNotifier, NotifyError, OutboxNotifier, VerificationNotifier};
pub use store::{InMemoryStore, PostgresStore, Store, StoreError};
pub use verification::VerificationManager;
