//! Postgres adapter for the identity store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::models::{Account, PendingCode};
use super::store::IdentityStore;

const ACCOUNT_COLUMNS: &str = "id, email, handle, avatar, verified, active, \
     otp_code, otp_expires_at, created_at, updated_at";

/// Identity store over one `accounts` row per email.
///
/// The pending code is two nullable columns written in lockstep; a check
/// constraint in the schema rules out one being set without the other.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Account {
        let otp_code: Option<String> = row.get("otp_code");
        let otp_expires_at: Option<chrono::DateTime<chrono::Utc>> = row.get("otp_expires_at");
        let pending = match (otp_code, otp_expires_at) {
            (Some(code), Some(expires_at)) => Some(PendingCode { code, expires_at }),
            _ => None,
        };
        Account {
            id: row.get("id"),
            email: row.get("email"),
            handle: row.get("handle"),
            avatar: row.get("avatar"),
            verified: row.get("verified"),
            active: row.get("active"),
            pending,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    async fn load_one(&self, query: String, bind: &str) -> Result<Option<Account>> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account")?;
        Ok(row.as_ref().map(Self::from_row))
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn load_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        self.load_one(query, email).await
    }

    async fn load_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account by id")?;
        Ok(row.as_ref().map(Self::from_row))
    }

    async fn load_by_handle(&self, handle: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE handle = $1");
        self.load_one(query, handle).await
    }

    async fn save(&self, account: &Account) -> Result<Account> {
        // Whole-record upsert keyed by email: racing writers resolve via
        // last-write-wins, which is safe because the only contended state is
        // the pending code.
        let query = format!(
            r"
            INSERT INTO accounts
                (email, handle, avatar, verified, active, otp_code, otp_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (email) DO UPDATE SET
                handle = EXCLUDED.handle,
                avatar = EXCLUDED.avatar,
                verified = EXCLUDED.verified,
                active = EXCLUDED.active,
                otp_code = EXCLUDED.otp_code,
                otp_expires_at = EXCLUDED.otp_expires_at,
                updated_at = NOW()
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let (otp_code, otp_expires_at) = match &account.pending {
            Some(pending) => (Some(pending.code.as_str()), Some(pending.expires_at)),
            None => (None, None),
        };
        let row = sqlx::query(&query)
            .bind(&account.email)
            .bind(&account.handle)
            .bind(&account.avatar)
            .bind(account.verified)
            .bind(account.active)
            .bind(otp_code)
            .bind(otp_expires_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to save account")?;
        Ok(Self::from_row(&row))
    }

    async fn handle_taken(&self, handle: &str, excluding: Uuid) -> Result<bool> {
        let query = "SELECT 1 FROM accounts WHERE handle = $1 AND verified AND id <> $2 LIMIT 1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(handle)
            .bind(excluding)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to check handle uniqueness")?;
        Ok(row.is_some())
    }
}
