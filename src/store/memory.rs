//! In-memory record store for tests and local development.

use super::{RecordStore, StoreError};
use crate::auth::types::{Account, AccountId, TenantId, TenantMembership};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Records {
    accounts: Vec<Account>,
    memberships: Vec<TenantMembership>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Records>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_account(&self, account: Account) {
        let mut records = self.records.write().await;
        records.accounts.retain(|a| a.id != account.id);
        records.accounts.push(account);
    }

    pub async fn insert_membership(&self, membership: TenantMembership) {
        let mut records = self.records.write().await;
        records.memberships.retain(|m| {
            !(m.tenant_id == membership.tenant_id && m.account_id == membership.account_id)
        });
        records.memberships.push(membership);
    }

    /// Remove an account as a soft delete would: it disappears from every lookup.
    pub async fn remove_account(&self, id: AccountId) {
        let mut records = self.records.write().await;
        records.accounts.retain(|a| a.id != id);
        records.memberships.retain(|m| m.account_id != id);
    }

    pub async fn remove_membership(&self, tenant_id: TenantId, account_id: AccountId) {
        self.records
            .write()
            .await
            .memberships
            .retain(|m| !(m.tenant_id == tenant_id && m.account_id == account_id));
    }

    pub async fn membership(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Option<TenantMembership> {
        self.records
            .read()
            .await
            .memberships
            .iter()
            .find(|m| m.tenant_id == tenant_id && m.account_id == account_id)
            .cloned()
    }

    async fn find_account(&self, matches: impl Fn(&Account) -> bool) -> Result<Account, StoreError> {
        self.records
            .read()
            .await
            .accounts
            .iter()
            .find(|a| matches(a))
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_account_by_username(&self, username: &str) -> Result<Account, StoreError> {
        self.find_account(|a| a.username.eq_ignore_ascii_case(username))
            .await
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.find_account(|a| a.email.eq_ignore_ascii_case(email))
            .await
    }

    async fn find_account_by_id(&self, id: AccountId) -> Result<Account, StoreError> {
        self.find_account(|a| a.id == id).await
    }

    async fn find_memberships_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TenantMembership>, StoreError> {
        let mut memberships: Vec<TenantMembership> = self
            .records
            .read()
            .await
            .memberships
            .iter()
            .filter(|m| m.account_id == account_id && m.status.is_active())
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.tenant_id);
        Ok(memberships)
    }

    async fn update_last_login_at(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let membership = records
            .memberships
            .iter_mut()
            .find(|m| m.tenant_id == tenant_id && m.account_id == account_id)
            .ok_or(StoreError::NotFound)?;
        membership.last_login_at = Some(Utc::now());
        Ok(())
    }

    async fn update_password_hash(
        &self,
        account_id: AccountId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let account = records
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or(StoreError::NotFound)?;
        account.password_hash = password_hash.to_string();
        account.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{Role, Status};
    use anyhow::Result;

    fn account(id: AccountId, username: &str) -> Account {
        let now = Utc::now();
        Account {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: "hash".to_string(),
            role: Role::User,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn lookups_distinguish_not_found() -> Result<()> {
        let store = MemoryStore::new();
        store.insert_account(account(1, "alice")).await;

        assert_eq!(store.find_account_by_username("ALICE").await?.id, 1);
        assert_eq!(store.find_account_by_email("alice@example.com").await?.id, 1);
        assert!(store
            .find_account_by_id(2)
            .await
            .err()
            .is_some_and(|e| e.is_not_found()));
        Ok(())
    }

    #[tokio::test]
    async fn memberships_exclude_inactive() -> Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (tenant_id, status) in [(2, Status::Active), (1, Status::Disabled), (3, Status::Active)] {
            store
                .insert_membership(TenantMembership {
                    tenant_id,
                    account_id: 1,
                    tenant_name: format!("t{tenant_id}"),
                    role: Role::User,
                    status,
                    last_login_at: None,
                    created_at: now,
                })
                .await;
        }

        let ids: Vec<TenantId> = store
            .find_memberships_for_account(1)
            .await?
            .iter()
            .map(|m| m.tenant_id)
            .collect();
        assert_eq!(ids, vec![2, 3]);

        store.update_last_login_at(2, 1).await?;
        assert!(store
            .membership(2, 1)
            .await
            .and_then(|m| m.last_login_at)
            .is_some());
        Ok(())
    }
}
