//! Delivery of verification links.
//!
//! No mail is sent: the console notifier prints a banner on stdout and the log
//! notifier emits a structured event. `OutboxNotifier` keeps announcements in
//! memory for tests and embedders.

use std::sync::Mutex;

use thiserror::Error;

use tally_auth::User;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait::async_trait]
pub trait VerificationNotifier: Send + Sync {
    /// Tell `user` where to confirm their email.
    async fn announce(&self, user: &User, link: &str) -> Result<(), NotifyError>;
}

/// Prints the link to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait::async_trait]
impl VerificationNotifier for ConsoleNotifier {
    async fn announce(&self, user: &User, link: &str) -> Result<(), NotifyError> {
        let rule = "=".repeat(80);
        println!("\n{rule}");
        println!("EMAIL VERIFICATION REQUIRED");
        println!("User: {} ({})", user.username, user.email);
        println!("Verification URL: {link}");
        println!("{rule}\n");
        Ok(())
    }
}

/// Emits the link as a tracing event; the log stream is the delivery channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl VerificationNotifier for LogNotifier {
    async fn announce(&self, user: &User, link: &str) -> Result<(), NotifyError> {
        tracing::info!(
            target: "tally::notify",
            user_id = %user.id,
            username = %user.username,
            email = %user.email,
            link = %link,
            "verification link issued"
        );
        Ok(())
    }
}

/// One recorded announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub username: String,
    pub email: String,
    pub link: String,
}

impl Announcement {
    /// The verification key: last path segment of the link.
    pub fn key(&self) -> Option<&str> {
        self.link.trim_end_matches('/').rsplit('/').next().filter(|k| !k.is_empty())
    }
}

/// Keeps every announcement in memory.
#[derive(Debug, Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<Announcement>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything announced so far, oldest first.
    pub fn sent(&self) -> Vec<Announcement> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Most recent announcement to `email`.
    pub fn latest_for(&self, email: &str) -> Option<Announcement> {
        self.sent()
            .into_iter()
            .rev()
            .find(|a| a.email.eq_ignore_ascii_case(email))
    }
}

#[async_trait::async_trait]
impl VerificationNotifier for OutboxNotifier {
    async fn announce(&self, user: &User, link: &str) -> Result<(), NotifyError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| NotifyError("outbox lock poisoned".to_string()))?;
        sent.push(Announcement {
            username: user.username.clone(),
            email: user.email.clone(),
            link: link.to_string(),
        });
        Ok(())
    }
}

/// Link users follow to confirm their email.
pub fn confirmation_link(public_base_url: &str, key: &str) -> String {
    format!("{}/account-confirm-email/{key}/", public_base_url.trim_end_matches('/'))
}
