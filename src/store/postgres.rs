//! PostgreSQL record store.

use super::{RecordStore, StoreError};
use crate::auth::types::{Account, AccountId, Role, Status, TenantId, TenantMembership};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, role, status, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_account(&self, query: &str, bind: AccountLookup<'_>) -> Result<Account, StoreError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let statement = sqlx::query(query);
        let statement = match bind {
            AccountLookup::Text(value) => statement.bind(value),
            AccountLookup::Id(id) => statement.bind(id),
        };
        let row = statement
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?
            .ok_or(StoreError::NotFound)?;

        account_from_row(&row)
    }
}

enum AccountLookup<'a> {
    Text(&'a str),
    Id(AccountId),
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(StoreError::InvalidRecord)
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: parse_column::<Role>(row, "role")?,
        status: parse_column::<Status>(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<TenantMembership, StoreError> {
    Ok(TenantMembership {
        tenant_id: row.try_get("tenant_id")?,
        account_id: row.try_get("account_id")?,
        tenant_name: row.try_get("tenant_name")?,
        role: parse_column::<Role>(row, "role")?,
        status: parse_column::<Status>(row, "status")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RecordStore for PgStore {
    async fn find_account_by_username(&self, username: &str) -> Result<Account, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(username) = lower($1) AND deleted_at IS NULL"
        );
        self.find_account(&query, AccountLookup::Text(username)).await
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE lower(email) = lower($1) AND deleted_at IS NULL"
        );
        self.find_account(&query, AccountLookup::Text(email)).await
    }

    async fn find_account_by_id(&self, id: AccountId) -> Result<Account, StoreError> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND deleted_at IS NULL");
        self.find_account(&query, AccountLookup::Id(id)).await
    }

    async fn find_memberships_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TenantMembership>, StoreError> {
        let query = r"
            SELECT m.tenant_id, m.account_id, t.name AS tenant_name, m.role, m.status,
                   m.last_login_at, m.created_at
            FROM tenant_memberships m
            JOIN tenants t ON t.id = m.tenant_id
            WHERE m.account_id = $1
              AND m.status = 'active'
              AND m.deleted_at IS NULL
              AND t.status = 'active'
              AND t.deleted_at IS NULL
            ORDER BY m.tenant_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(account_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        rows.iter().map(membership_from_row).collect()
    }

    async fn update_last_login_at(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE tenant_memberships
            SET last_login_at = NOW(), updated_at = NOW()
            WHERE tenant_id = $1 AND account_id = $2 AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(tenant_id)
            .bind(account_id)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_password_hash(
        &self,
        account_id: AccountId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(account_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
