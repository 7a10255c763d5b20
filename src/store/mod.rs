//! Record store abstraction for accounts and tenant memberships.
//!
//! The store is the source of truth. Soft-deleted rows are invisible through every
//! lookup, and `NotFound` is a distinct outcome so callers can tell a missing
//! account from a database failure.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

use crate::auth::types::{Account, AccountId, TenantId, TenantMembership};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("store operation `{0}` timed out")]
    Timeout(&'static str),
}

impl StoreError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_account_by_username(&self, username: &str) -> Result<Account, StoreError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Account, StoreError>;

    async fn find_account_by_id(&self, id: AccountId) -> Result<Account, StoreError>;

    /// Active memberships of the account in active tenants, with tenant names joined.
    async fn find_memberships_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TenantMembership>, StoreError>;

    async fn update_last_login_at(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<(), StoreError>;

    async fn update_password_hash(
        &self,
        account_id: AccountId,
        password_hash: &str,
    ) -> Result<(), StoreError>;
}
