//! Service-level tests over the in-memory store.
//!
//! Flows: register → verify → login, token lifecycle edge cases, record
//! ownership, pagination and type filtering.

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::Barrier;
    use uuid::Uuid;

    use tally_auth::{Principal, Registration, User, VerificationKey, VerificationToken};
    use tally_core::{Clock, DomainError, RecordId, TokenId, UserId};
    use tally_ledger::{LedgerRecord, PageRequest, RecordInput, RecordPatch, TransactionType};

    use crate::accounts::{AuthService, INVALID_CREDENTIALS, NO_PENDING_VERIFICATION, UNVERIFIED_LOGIN};
    use crate::config::SuperuserBootstrap;
    use crate::error::ServiceError;
    use crate::ledger_query::LedgerService;
    use crate::notify::OutboxNotifier;
    use crate::store::{
        InMemoryStore, RecordQuery, RecordStore, Store, StoreError, TokenBlacklist, UserStore, VerificationStore,
    };

    const PASSWORD: &str = "correct-horse-battery";

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Self {
            let start = DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
                .unwrap()
                .with_timezone(&Utc);
            Self(Mutex::new(start))
        }

        fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct Harness {
        store: Arc<InMemoryStore>,
        outbox: Arc<OutboxNotifier>,
        clock: Arc<ManualClock>,
        auth: AuthService,
        ledger: LedgerService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let outbox = Arc::new(OutboxNotifier::new());
        let clock = Arc::new(ManualClock::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let jwt = tally_auth::Hs256Jwt::new(b"test-secret", Duration::minutes(5), Duration::days(1));
        let auth = AuthService::new(
            dyn_store.clone(),
            outbox.clone(),
            Arc::new(jwt),
            clock.clone(),
            "http://tally.test",
        );
        let ledger = LedgerService::new(dyn_store, clock.clone());
        Harness {
            store,
            outbox,
            clock,
            auth,
            ledger,
        }
    }

    /// In-memory store with injectable faults.
    ///
    /// - `fail_registration`: the user+token write fails after touching nothing.
    /// - `read_barrier`: every `record_by_id` waits here, so concurrent callers
    ///   all read before any of them writes.
    #[derive(Default)]
    struct FaultyStore {
        inner: InMemoryStore,
        fail_registration: AtomicBool,
        read_barrier: Option<Barrier>,
    }

    #[async_trait::async_trait]
    impl UserStore for FaultyStore {
        async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
            self.inner.insert_user(user).await
        }

        async fn insert_user_with_token(&self, user: &User, token: &VerificationToken) -> Result<(), StoreError> {
            if self.fail_registration.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("disk full".to_string()));
            }
            self.inner.insert_user_with_token(user, token).await
        }

        async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.inner.user_by_id(id).await
        }

        async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
            self.inner.user_by_username(username).await
        }

        async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.inner.user_by_email(email).await
        }
    }

    #[async_trait::async_trait]
    impl VerificationStore for FaultyStore {
        async fn insert_token(&self, token: &VerificationToken) -> Result<(), StoreError> {
            self.inner.insert_token(token).await
        }

        async fn replace_pending_tokens(&self, user_id: UserId, token: &VerificationToken) -> Result<u64, StoreError> {
            self.inner.replace_pending_tokens(user_id, token).await
        }

        async fn pending_token_by_key(&self, key: &VerificationKey) -> Result<Option<VerificationToken>, StoreError> {
            self.inner.pending_token_by_key(key).await
        }

        async fn pending_tokens_for(&self, user_id: UserId) -> Result<Vec<VerificationToken>, StoreError> {
            self.inner.pending_tokens_for(user_id).await
        }

        async fn redeem_and_activate(
            &self,
            token_id: TokenId,
            verified_at: DateTime<Utc>,
        ) -> Result<Option<User>, StoreError> {
            self.inner.redeem_and_activate(token_id, verified_at).await
        }
    }

    #[async_trait::async_trait]
    impl RecordStore for FaultyStore {
        async fn insert_record(&self, record: &LedgerRecord) -> Result<(), StoreError> {
            self.inner.insert_record(record).await
        }

        async fn record_by_id(&self, id: RecordId) -> Result<Option<LedgerRecord>, StoreError> {
            let record = self.inner.record_by_id(id).await;
            if let Some(barrier) = &self.read_barrier {
                barrier.wait().await;
            }
            record
        }

        async fn update_record(
            &self,
            id: RecordId,
            patch: &RecordPatch,
            updated_at: DateTime<Utc>,
        ) -> Result<Option<LedgerRecord>, StoreError> {
            self.inner.update_record(id, patch, updated_at).await
        }

        async fn delete_record(&self, id: RecordId) -> Result<bool, StoreError> {
            self.inner.delete_record(id).await
        }

        async fn count_records(&self, query: RecordQuery) -> Result<u64, StoreError> {
            self.inner.count_records(query).await
        }

        async fn list_records(&self, query: RecordQuery, offset: u64, limit: u64) -> Result<Vec<LedgerRecord>, StoreError> {
            self.inner.list_records(query, offset, limit).await
        }
    }

    #[async_trait::async_trait]
    impl TokenBlacklist for FaultyStore {
        async fn revoke(&self, jti: Uuid, user_id: UserId, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.revoke(jti, user_id, expires_at).await
        }

        async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
            self.inner.is_revoked(jti).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.purge_expired(now).await
        }
    }

    fn services_over(store: Arc<FaultyStore>) -> (AuthService, LedgerService, Arc<OutboxNotifier>) {
        let outbox = Arc::new(OutboxNotifier::new());
        let clock = Arc::new(ManualClock::new());
        let jwt = tally_auth::Hs256Jwt::new(b"test-secret", Duration::minutes(5), Duration::days(1));
        let auth = AuthService::new(store.clone(), outbox.clone(), Arc::new(jwt), clock.clone(), "http://tally.test");
        let ledger = LedgerService::new(store, clock);
        (auth, ledger, outbox)
    }

    fn registration(username: &str) -> Registration {
        Registration {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: PASSWORD.to_string(),
            password_confirm: PASSWORD.to_string(),
            first_name: None,
            last_name: None,
        }
    }

    fn record_input(title: &str, transaction_type: &str) -> RecordInput {
        serde_json::from_value(serde_json::json!({
            "title": title,
            "amount": "100.00",
            "transaction_type": transaction_type,
        }))
        .unwrap()
    }

    fn latest_key(h: &Harness, username: &str) -> String {
        h.outbox
            .latest_for(&format!("{username}@example.com"))
            .and_then(|a| a.key().map(str::to_string))
            .expect("verification link announced")
    }

    fn validation_message(err: &ServiceError) -> Option<&str> {
        match err.domain() {
            Some(DomainError::Validation(msg)) => Some(msg.as_str()),
            _ => None,
        }
    }

    async fn verified_principal(h: &Harness, username: &str) -> Principal {
        h.auth.register(registration(username)).await.unwrap();
        h.auth.confirm(&latest_key(h, username)).await.unwrap();
        let user = h.store.user_by_username(username).await.unwrap().unwrap();
        Principal::from(&user)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration & verification
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn registration_creates_inactive_user_with_one_pending_token() {
        let h = harness();
        let profile = h.auth.register(registration("alice")).await.unwrap();
        assert_eq!(profile.username, "alice");
        assert!(!profile.is_superuser);

        let user = h.store.user_by_id(profile.id).await.unwrap().unwrap();
        assert!(!user.is_active);
        assert_ne!(user.password_hash, PASSWORD);

        let pending = h.store.pending_tokens_for(user.id).await.unwrap();
        assert_eq!(pending.len(), 1);

        let sent = h.outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].link,
            format!("http://tally.test/account-confirm-email/{}/", pending[0].key)
        );
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_field_errors() {
        let h = harness();
        h.auth.register(registration("alice")).await.unwrap();

        let mut dup = registration("alice");
        dup.email = "ALICE@EXAMPLE.COM".to_string();
        let err = h.auth.register(dup).await.unwrap_err();
        match err.domain() {
            Some(DomainError::InvalidFields(fields)) => {
                assert!(fields.contains_key("username"));
                assert!(fields.contains_key("email"));
            }
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_registration_write_leaves_nothing_behind() {
        let store = Arc::new(FaultyStore::default());
        let (auth, _, outbox) = services_over(store.clone());

        store.fail_registration.store(true, Ordering::SeqCst);
        let err = auth.register(registration("tess")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
        assert!(store.user_by_username("tess").await.unwrap().is_none());
        assert!(outbox.sent().is_empty());

        // The same registration can simply be retried.
        store.fail_registration.store(false, Ordering::SeqCst);
        let profile = auth.register(registration("tess")).await.unwrap();
        assert_eq!(store.pending_tokens_for(profile.id).await.unwrap().len(), 1);
        assert_eq!(outbox.sent().len(), 1);
    }

    #[tokio::test]
    async fn mismatched_and_weak_passwords_are_rejected() {
        let h = harness();
        let mut reg = registration("bob");
        reg.password = "12345678".to_string();
        reg.password_confirm = "12345679".to_string();

        let err = h.auth.register(reg).await.unwrap_err();
        match err.domain() {
            Some(DomainError::InvalidFields(fields)) => {
                assert!(fields.contains_key("password"));
                assert_eq!(fields["non_field_errors"], vec!["Password fields didn't match.".to_string()]);
            }
            other => panic!("expected field errors, got {other:?}"),
        }
        assert!(h.store.user_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_redemption_is_not_found() {
        let h = harness();
        h.auth.register(registration("carol")).await.unwrap();
        let key = latest_key(&h, "carol");

        let confirmed = h.auth.confirm(&key).await.unwrap();
        assert!(confirmed.is_active);

        let err = h.auth.confirm(&key).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::NotFound));
        let user = h.store.user_by_username("carol").await.unwrap().unwrap();
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn redemption_just_inside_the_window_succeeds() {
        let h = harness();
        h.auth.register(registration("dave")).await.unwrap();
        let key = latest_key(&h, "dave");

        h.clock.advance(Duration::minutes(14) + Duration::seconds(59));
        assert!(h.auth.confirm(&key).await.is_ok());
    }

    #[tokio::test]
    async fn redemption_after_the_window_is_expired_and_stays_pending() {
        let h = harness();
        let profile = h.auth.register(registration("erin")).await.unwrap();
        let key = latest_key(&h, "erin");

        h.clock.advance(Duration::minutes(15) + Duration::seconds(1));
        let err = h.auth.confirm(&key).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::Expired));

        let pending = h.store.pending_tokens_for(profile.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        let user = h.store.user_by_id(profile.id).await.unwrap().unwrap();
        assert!(!user.is_active);
    }

    #[tokio::test]
    async fn resend_invalidates_old_key() {
        let h = harness();
        let profile = h.auth.register(registration("frank")).await.unwrap();
        let old_key = latest_key(&h, "frank");

        h.auth.resend_verification("frank@example.com").await.unwrap();
        let new_key = latest_key(&h, "frank");
        assert_ne!(old_key, new_key);

        let pending = h.store.pending_tokens_for(profile.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key.as_str(), new_key);

        let err = h.auth.confirm(&old_key).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::NotFound));
        assert!(h.auth.confirm(&new_key).await.is_ok());
    }

    #[tokio::test]
    async fn request_verification_reannounces_without_refreshing_expiry() {
        let h = harness();
        h.auth.register(registration("gina")).await.unwrap();
        let key = latest_key(&h, "gina");

        h.clock.advance(Duration::minutes(10));
        h.auth.request_verification("gina@example.com").await.unwrap();
        assert_eq!(h.outbox.sent().len(), 2);
        assert_eq!(latest_key(&h, "gina"), key);

        h.clock.advance(Duration::minutes(6));
        let err = h.auth.confirm(&key).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::Expired));
    }

    #[tokio::test]
    async fn request_verification_preconditions() {
        let h = harness();
        let err = h.auth.request_verification("nobody@example.com").await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::InvalidFields(f)) if f.contains_key("email")));

        let err = h.auth.resend_verification("not-an-email").await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::InvalidFields(f)) if f.contains_key("email")));

        verified_principal(&h, "hank").await;
        let err = h.auth.resend_verification("hank@example.com").await.unwrap_err();
        match err.domain() {
            Some(DomainError::InvalidFields(fields)) => {
                assert_eq!(fields["email"], vec!["Email is already verified.".to_string()]);
            }
            other => panic!("expected field errors, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_verification_without_pending_token() {
        let h = harness();
        let user = User::new_inactive("ivy", "ivy@example.com", "hash".to_string(), "", "", h.clock.now());
        h.store.insert_user(&user).await.unwrap();

        let err = h.auth.request_verification("ivy@example.com").await.unwrap_err();
        assert_eq!(validation_message(&err), Some(NO_PENDING_VERIFICATION));
        assert!(h.outbox.sent().is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn login_requires_verified_email() {
        let h = harness();
        h.auth.register(registration("jack")).await.unwrap();

        let err = h.auth.login("jack", PASSWORD).await.unwrap_err();
        assert_eq!(validation_message(&err), Some(UNVERIFIED_LOGIN));

        h.auth.confirm(&latest_key(&h, "jack")).await.unwrap();
        let outcome = h.auth.login("jack", PASSWORD).await.unwrap();
        assert_eq!(outcome.user.username, "jack");

        let principal = h.auth.authenticate(&outcome.tokens.access).await.unwrap();
        assert_eq!(principal.user_id, outcome.user.id);
        assert!(!principal.is_superuser);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let h = harness();
        verified_principal(&h, "kate").await;

        let wrong = h.auth.login("kate", "not-the-password").await.unwrap_err();
        let unknown = h.auth.login("nobody", PASSWORD).await.unwrap_err();
        assert_eq!(validation_message(&wrong), Some(INVALID_CREDENTIALS));
        assert_eq!(validation_message(&unknown), Some(INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn access_token_is_rejected_after_expiry_and_as_refresh() {
        let h = harness();
        verified_principal(&h, "liam").await;
        let tokens = h.auth.login("liam", PASSWORD).await.unwrap().tokens;

        assert!(matches!(h.auth.refresh(&tokens.access).await, Err(ServiceError::Authentication(_))));
        assert!(matches!(h.auth.authenticate(&tokens.refresh).await, Err(ServiceError::Authentication(_))));

        h.clock.advance(Duration::minutes(6));
        assert!(matches!(h.auth.authenticate(&tokens.access).await, Err(ServiceError::Authentication(_))));

        let access = h.auth.refresh(&tokens.refresh).await.unwrap();
        assert!(h.auth.authenticate(&access).await.is_ok());
    }

    #[tokio::test]
    async fn logout_blacklists_refresh_token() {
        let h = harness();
        let principal = verified_principal(&h, "mia").await;
        let tokens = h.auth.login("mia", PASSWORD).await.unwrap().tokens;

        let err = h.auth.logout(&principal, None).await.unwrap_err();
        assert_eq!(validation_message(&err), Some("Refresh token required"));

        let err = h.auth.logout(&principal, Some("garbage")).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::InvalidToken));

        h.auth.logout(&principal, Some(&tokens.refresh)).await.unwrap();
        assert!(matches!(h.auth.refresh(&tokens.refresh).await, Err(ServiceError::Authentication(_))));

        let err = h.auth.logout(&principal, Some(&tokens.refresh)).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::InvalidToken));
    }

    #[tokio::test]
    async fn logout_purges_revocations_past_their_expiry() {
        let h = harness();
        let principal = verified_principal(&h, "uma").await;

        let first = h.auth.login("uma", PASSWORD).await.unwrap().tokens;
        h.auth.logout(&principal, Some(&first.refresh)).await.unwrap();

        // The first refresh token (1 day) has expired by now.
        h.clock.advance(Duration::days(2));
        let second = h.auth.login("uma", PASSWORD).await.unwrap().tokens;
        h.auth.logout(&principal, Some(&second.refresh)).await.unwrap();

        // Only the second revocation is left to purge.
        let far_future = h.clock.now() + Duration::days(30);
        assert_eq!(h.store.purge_expired(far_future).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn logout_with_someone_elses_token_is_invalid() {
        let h = harness();
        let nina = verified_principal(&h, "nina").await;
        verified_principal(&h, "owen").await;
        let owen_tokens = h.auth.login("owen", PASSWORD).await.unwrap().tokens;

        let err = h.auth.logout(&nina, Some(&owen_tokens.refresh)).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::InvalidToken));
        assert!(h.auth.refresh(&owen_tokens.refresh).await.is_ok());
    }

    #[tokio::test]
    async fn bootstrap_superuser_is_active_and_idempotent() {
        let h = harness();
        let bootstrap = SuperuserBootstrap {
            username: "root".to_string(),
            email: "root@example.com".to_string(),
            password: PASSWORD.to_string(),
        };
        let first = h.auth.ensure_superuser(&bootstrap).await.unwrap();
        let second = h.auth.ensure_superuser(&bootstrap).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.is_superuser);

        let outcome = h.auth.login("root", PASSWORD).await.unwrap();
        let principal = h.auth.authenticate(&outcome.tokens.access).await.unwrap();
        assert!(principal.is_superuser);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ledger records
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn foreign_records_are_not_found_for_every_operation() {
        let h = harness();
        let owner = verified_principal(&h, "paul").await;
        let other = verified_principal(&h, "quinn").await;
        let root = Principal::superuser(tally_core::UserId::new());

        let record = h.ledger.create(&owner, record_input("Rent", "debit")).await.unwrap();
        assert_eq!(record.owner, owner.user_id);

        for id in [record.id, RecordId::new()] {
            let get = h.ledger.get(&other, id).await.unwrap_err();
            let update = h.ledger.update(&other, id, record_input("Hacked", "credit")).await.unwrap_err();
            let delete = h.ledger.delete(&other, id).await.unwrap_err();
            for err in [get, update, delete] {
                assert_eq!(err.domain(), Some(&DomainError::NotFound));
            }
        }

        assert_eq!(h.ledger.get(&owner, record.id).await.unwrap().title, "Rent");
        let updated = h
            .ledger
            .update(&root, record.id, serde_json::from_str(r#"{"tax":"10","tax_type":"percentage"}"#).unwrap())
            .await
            .unwrap();
        assert_eq!(updated.title, "Rent");
        assert_eq!(updated.owner, owner.user_id);
        assert_eq!(updated.total(), Decimal::from_str("110.00").unwrap());

        h.ledger.delete(&owner, record.id).await.unwrap();
        let err = h.ledger.get(&owner, record.id).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::NotFound));
    }

    #[tokio::test]
    async fn update_bumps_updated_at_only() {
        let h = harness();
        let owner = verified_principal(&h, "rita").await;
        let record = h.ledger.create(&owner, record_input("Salary", "credit")).await.unwrap();

        h.clock.advance(Duration::minutes(3));
        let updated = h
            .ledger
            .update(&owner, record.id, serde_json::from_str(r#"{"amount":"250.5"}"#).unwrap())
            .await
            .unwrap();
        assert_eq!(updated.created_at, record.created_at);
        assert_eq!(updated.updated_at, record.created_at + Duration::minutes(3));
        assert_eq!(updated.amount, Decimal::from_str("250.50").unwrap());
        assert_eq!(updated.transaction_type, TransactionType::Credit);
    }

    #[tokio::test]
    async fn concurrent_partial_updates_keep_both_fields() {
        let store = Arc::new(FaultyStore {
            read_barrier: Some(Barrier::new(2)),
            ..FaultyStore::default()
        });
        let (_, ledger, _) = services_over(store.clone());
        let owner = Principal {
            user_id: UserId::new(),
            is_superuser: false,
        };
        let record = ledger.create(&owner, record_input("Rent", "debit")).await.unwrap();

        let title: RecordInput = serde_json::from_str(r#"{"title":"Rent May"}"#).unwrap();
        let amount: RecordInput = serde_json::from_str(r#"{"amount":"950"}"#).unwrap();
        let (a, b) = tokio::join!(
            ledger.update(&owner, record.id, title),
            ledger.update(&owner, record.id, amount),
        );
        a.unwrap();
        b.unwrap();

        let stored = store.inner.record_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Rent May");
        assert_eq!(stored.amount, Decimal::from_str("950.00").unwrap());
        assert_eq!(stored.owner, owner.user_id);
    }

    #[tokio::test]
    async fn pagination_over_twenty_five_records() {
        let h = harness();
        let owner = verified_principal(&h, "sam").await;
        for i in 0..25 {
            h.clock.advance(Duration::seconds(1));
            h.ledger.create(&owner, record_input(&format!("r{i}"), "debit")).await.unwrap();
        }

        let first = h.ledger.list(&owner, PageRequest::parse(None, Some("10")).unwrap()).await.unwrap();
        assert_eq!(first.count, 25);
        assert_eq!(first.results.len(), 10);
        assert_eq!(first.results[0].title, "r24");
        assert_eq!(first.next.as_deref(), Some("?page=2&page_size=10"));
        assert!(first.previous.is_none());

        let third = h.ledger.list(&owner, PageRequest::parse(Some("3"), Some("10")).unwrap()).await.unwrap();
        assert_eq!(third.results.len(), 5);
        assert!(third.next.is_none());
        assert_eq!(third.results[4].title, "r0");

        let err = h
            .ledger
            .list(&owner, PageRequest::parse(Some("4"), Some("10")).unwrap())
            .await
            .unwrap_err();
        assert_eq!(validation_message(&err), Some("Invalid page number"));
    }

    #[tokio::test]
    async fn listing_scope_depends_on_superuser_flag() {
        let h = harness();
        let a = verified_principal(&h, "tom").await;
        let b = verified_principal(&h, "uma").await;
        h.ledger.create(&a, record_input("a", "debit")).await.unwrap();
        h.ledger.create(&b, record_input("b", "debit")).await.unwrap();

        let own = h.ledger.list(&a, PageRequest::default()).await.unwrap();
        assert_eq!(own.count, 1);
        let all = h
            .ledger
            .list(&Principal::superuser(a.user_id), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.count, 2);

        let empty = verified_principal(&h, "vic").await;
        let page = h.ledger.list(&empty, PageRequest::default()).await.unwrap();
        assert_eq!(page.count, 0);
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn list_by_type_filters_and_caps() {
        let h = harness();
        let owner = verified_principal(&h, "wes").await;
        for i in 0..23 {
            h.clock.advance(Duration::seconds(1));
            h.ledger.create(&owner, record_input(&format!("d{i}"), "debit")).await.unwrap();
        }
        for i in 0..3 {
            h.clock.advance(Duration::seconds(1));
            h.ledger.create(&owner, record_input(&format!("c{i}"), "credit")).await.unwrap();
        }

        let debits = h.ledger.list_by_type(&owner, Some("debit")).await.unwrap();
        assert_eq!(debits.len(), 20);
        assert!(debits.iter().all(|r| r.transaction_type == TransactionType::Debit));
        assert_eq!(debits[0].title, "d22");

        let credits = h.ledger.list_by_type(&owner, Some("credit")).await.unwrap();
        assert_eq!(credits.len(), 3);

        let any = h.ledger.list_by_type(&owner, None).await.unwrap();
        assert_eq!(any.len(), 20);
        assert_eq!(any[0].title, "c2");

        let err = h.ledger.list_by_type(&owner, Some("refund")).await.unwrap_err();
        assert_eq!(validation_message(&err), Some("Invalid transaction type specified"));
    }

    #[tokio::test]
    async fn create_reports_field_errors() {
        let h = harness();
        let owner = verified_principal(&h, "xena").await;
        let input: RecordInput = serde_json::from_str(r#"{"title":"","amount":"-1","transaction_type":"debit"}"#).unwrap();
        let err = h.ledger.create(&owner, input).await.unwrap_err();
        match err.domain() {
            Some(DomainError::InvalidFields(fields)) => {
                assert!(fields.contains_key("title"));
                assert!(fields.contains_key("amount"));
            }
            other => panic!("expected field errors, got {other:?}"),
        }
    }
}
