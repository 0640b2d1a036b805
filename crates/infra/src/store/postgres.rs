//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |
//!
//! Enums are stored as their lowercase text form and decoded through the
//! domain `FromStr` impls; an unknown value in a row is a `Backend` error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use tally_auth::{RecordScope, User, VerificationKey, VerificationToken};
use tally_core::{RecordId, TokenId, UserId};
use tally_ledger::{LedgerRecord, RecordPatch, TaxType, TransactionType};

use super::{RecordQuery, RecordStore, StoreError, TokenBlacklist, UserStore, VerificationStore};

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, is_active, is_superuser, date_joined";
const TOKEN_COLUMNS: &str = "id, user_id, key, created_at, is_verified, verified_at";
const RECORD_COLUMNS: &str =
    "id, owner_id, title, description, amount, transaction_type, tax, tax_type, created_at, updated_at";

/// Partial update against the current row. Absent fields bind NULL and keep
/// the stored value; `description` carries a separate "supplied" flag since
/// NULL is a legal value for it.
const PATCH_RECORD_SQL: &str = r#"
    UPDATE ledger_records
    SET title = COALESCE($2::text, title),
        description = CASE WHEN $3::boolean THEN $4::text ELSE description END,
        amount = COALESCE($5::numeric, amount),
        transaction_type = COALESCE($6::text, transaction_type),
        tax = COALESCE($7::numeric, tax),
        tax_type = COALESCE($8::text, tax_type),
        updated_at = $9
    WHERE id = $1
    RETURNING id, owner_id, title, description, amount, transaction_type, tax, tax_type, created_at, updated_at
"#;

/// Postgres implementation of every store trait.
///
/// Multi-row operations run inside a transaction; the pending check of
/// `redeem_and_activate` is part of the `UPDATE ... WHERE` so a concurrent
/// redeem loses cleanly.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and apply the embedded schema.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        insert_user_row(&*self.pool, user)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))
    }

    #[instrument(skip(self, user, token), fields(user_id = %user.id), err)]
    async fn insert_user_with_token(&self, user: &User, token: &VerificationToken) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        insert_user_row(&mut *tx, user)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?;
        insert_token_row(&mut *tx, token)
            .await
            .map_err(|e| map_sqlx_error("insert_token", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    #[instrument(skip(self), err)]
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_id", e))?;
        row.map(|r| decode::<UserRow>(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_username", e))?;
        row.map(|r| decode::<UserRow>(&r)).transpose()
    }

    #[instrument(skip(self, email), err)]
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_email", e))?;
        row.map(|r| decode::<UserRow>(&r)).transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Verification tokens
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl VerificationStore for PostgresStore {
    #[instrument(skip(self, token), fields(user_id = %token.user_id), err)]
    async fn insert_token(&self, token: &VerificationToken) -> Result<(), StoreError> {
        insert_token_row(&*self.pool, token)
            .await
            .map_err(|e| map_sqlx_error("insert_token", e))
    }

    #[instrument(skip(self, token), err)]
    async fn replace_pending_tokens(
        &self,
        user_id: UserId,
        token: &VerificationToken,
    ) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Closed tokens keep is_verified = true with no verified_at.
        let closed = sqlx::query(
            r#"
            UPDATE verification_tokens
            SET is_verified = TRUE
            WHERE user_id = $1 AND NOT is_verified
            "#,
        )
        .bind(user_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("close_pending_tokens", e))?
        .rows_affected();

        insert_token_row(&mut *tx, token)
            .await
            .map_err(|e| map_sqlx_error("insert_token", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(closed)
    }

    #[instrument(skip(self, key), err)]
    async fn pending_token_by_key(
        &self,
        key: &VerificationKey,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM verification_tokens WHERE key = $1 AND NOT is_verified");
        let row = sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("pending_token_by_key", e))?;
        row.map(|r| decode::<TokenRow>(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn pending_tokens_for(&self, user_id: UserId) -> Result<Vec<VerificationToken>, StoreError> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM verification_tokens \
             WHERE user_id = $1 AND NOT is_verified \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("pending_tokens_for", e))?;
        rows.iter().map(decode::<TokenRow>).collect()
    }

    #[instrument(skip(self), err)]
    async fn redeem_and_activate(
        &self,
        token_id: TokenId,
        verified_at: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let owner: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE verification_tokens
            SET is_verified = TRUE, verified_at = $2
            WHERE id = $1 AND NOT is_verified
            RETURNING user_id
            "#,
        )
        .bind(token_id.as_uuid())
        .bind(verified_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("redeem_token", e))?;

        let Some(owner) = owner else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };

        let sql = format!("UPDATE users SET is_active = TRUE WHERE id = $1 RETURNING {USER_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(owner)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("activate_user", e))?;
        let user = decode::<UserRow>(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;
        Ok(Some(user))
    }
}

async fn insert_user_row<'e, E>(executor: E, user: &User) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO users (
            id, username, email, password_hash, first_name, last_name,
            is_active, is_superuser, date_joined
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(user.id.as_uuid())
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.is_active)
    .bind(user.is_superuser)
    .bind(user.date_joined)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_token_row<'e, E>(executor: E, token: &VerificationToken) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO verification_tokens (id, user_id, key, created_at, is_verified, verified_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(token.id.as_uuid())
    .bind(token.user_id.as_uuid())
    .bind(token.key.as_str())
    .bind(token.created_at)
    .bind(token.is_verified)
    .bind(token.verified_at)
    .execute(executor)
    .await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger records
// ─────────────────────────────────────────────────────────────────────────────

fn scope_owner(query: &RecordQuery) -> Option<Uuid> {
    match query.scope {
        RecordScope::All => None,
        RecordScope::OwnedBy(owner) => Some(*owner.as_uuid()),
    }
}

#[async_trait::async_trait]
impl RecordStore for PostgresStore {
    #[instrument(skip(self, record), fields(record_id = %record.id, owner = %record.owner), err)]
    async fn insert_record(&self, record: &LedgerRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_records (
                id, owner_id, title, description, amount, transaction_type,
                tax, tax_type, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.owner.as_uuid())
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.amount)
        .bind(record.transaction_type.as_str())
        .bind(record.tax)
        .bind(record.tax_type.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_record", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn record_by_id(&self, id: RecordId) -> Result<Option<LedgerRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM ledger_records WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_by_id", e))?;
        row.map(|r| decode::<RecordRow>(&r)).transpose()
    }

    #[instrument(skip(self, patch), err)]
    async fn update_record(
        &self,
        id: RecordId,
        patch: &RecordPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<LedgerRecord>, StoreError> {
        let row = sqlx::query(PATCH_RECORD_SQL)
            .bind(id.as_uuid())
            .bind(patch.title.as_deref())
            .bind(patch.description.is_some())
            .bind(patch.description.as_ref().and_then(|d| d.as_deref()))
            .bind(patch.amount)
            .bind(patch.transaction_type.map(|t| t.as_str()))
            .bind(patch.tax)
            .bind(patch.tax_type.map(|t| t.as_str()))
            .bind(updated_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_record", e))?;
        row.map(|r| decode::<RecordRow>(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn delete_record(&self, id: RecordId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM ledger_records WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_record", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn count_records(&self, query: RecordQuery) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM ledger_records
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::text IS NULL OR transaction_type = $2)
            "#,
        )
        .bind(scope_owner(&query))
        .bind(query.transaction_type.map(|t| t.as_str()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_records", e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(skip(self), err)]
    async fn list_records(
        &self,
        query: RecordQuery,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<LedgerRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM ledger_records \
             WHERE ($1::uuid IS NULL OR owner_id = $1) \
               AND ($2::text IS NULL OR transaction_type = $2) \
             ORDER BY created_at DESC, id DESC \
             OFFSET $3 LIMIT $4"
        );
        let rows = sqlx::query(&sql)
            .bind(scope_owner(&query))
            .bind(query.transaction_type.map(|t| t.as_str()))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_records", e))?;
        rows.iter().map(decode::<RecordRow>).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh token blacklist
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl TokenBlacklist for PostgresStore {
    #[instrument(skip(self), err)]
    async fn revoke(&self, jti: Uuid, user_id: UserId, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(user_id.as_uuid())
        .bind(expires_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn is_revoked(&self, jti: Uuid) -> Result<bool, StoreError> {
        let revoked: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE jti = $1)")
            .bind(jti)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("is_revoked", e))?;
        Ok(revoked)
    }

    #[instrument(skip(self), err)]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("purge_expired", e))?;
        Ok(result.rows_affected())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn decode<'r, T>(row: &'r PgRow) -> Result<T::Domain, StoreError>
where
    T: FromRow<'r, PgRow> + IntoDomain,
{
    T::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))?
        .into_domain()
}

trait IntoDomain {
    type Domain;

    fn into_domain(self) -> Result<Self::Domain, StoreError>;
}

struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    is_superuser: bool,
    date_joined: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            is_active: row.try_get("is_active")?,
            is_superuser: row.try_get("is_superuser")?,
            date_joined: row.try_get("date_joined")?,
        })
    }
}

impl IntoDomain for UserRow {
    type Domain = User;

    fn into_domain(self) -> Result<User, StoreError> {
        Ok(User {
            id: UserId::from_uuid(self.id),
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            first_name: self.first_name,
            last_name: self.last_name,
            is_active: self.is_active,
            is_superuser: self.is_superuser,
            date_joined: self.date_joined,
        })
    }
}

struct TokenRow {
    id: Uuid,
    user_id: Uuid,
    key: String,
    created_at: DateTime<Utc>,
    is_verified: bool,
    verified_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for TokenRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            key: row.try_get("key")?,
            created_at: row.try_get("created_at")?,
            is_verified: row.try_get("is_verified")?,
            verified_at: row.try_get("verified_at")?,
        })
    }
}

impl IntoDomain for TokenRow {
    type Domain = VerificationToken;

    fn into_domain(self) -> Result<VerificationToken, StoreError> {
        Ok(VerificationToken {
            id: TokenId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            key: VerificationKey::from_string(self.key),
            created_at: self.created_at,
            is_verified: self.is_verified,
            verified_at: self.verified_at,
        })
    }
}

struct RecordRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: Option<String>,
    amount: Decimal,
    transaction_type: String,
    tax: Decimal,
    tax_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RecordRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            amount: row.try_get("amount")?,
            transaction_type: row.try_get("transaction_type")?,
            tax: row.try_get("tax")?,
            tax_type: row.try_get("tax_type")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl IntoDomain for RecordRow {
    type Domain = LedgerRecord;

    fn into_domain(self) -> Result<LedgerRecord, StoreError> {
        let transaction_type: TransactionType = self
            .transaction_type
            .parse()
            .map_err(|_| StoreError::Backend(format!("unknown transaction_type '{}'", self.transaction_type)))?;
        let tax_type: TaxType = self
            .tax_type
            .parse()
            .map_err(|_| StoreError::Backend(format!("unknown tax_type '{}'", self.tax_type)))?;

        Ok(LedgerRecord {
            id: RecordId::from_uuid(self.id),
            owner: UserId::from_uuid(self.owner_id),
            title: self.title,
            description: self.description,
            amount: self.amount,
            transaction_type,
            tax: self.tax,
            tax_type,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}
