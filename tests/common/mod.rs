#![allow(dead_code)]

use anyhow::{anyhow, Result};
use argon2::Params;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tessera::{
    auth::{
        Account, AccountId, Argon2Passwords, AuthConfig, AuthService, PasswordScheme, Role,
        Status, TenantId, TenantMembership, TokenManager,
    },
    cache::{CacheError, KeyValueCache, MemoryCache},
    store::{MemoryStore, RecordStore, StoreError},
};

pub const PASSWORD: &str = "correct horse battery staple";

/// Argon2 with minimal cost so tests stay fast.
pub fn cheap_passwords() -> Result<Arc<Argon2Passwords>> {
    let params = Params::new(8, 1, 1, None).map_err(|e| anyhow!("{e}"))?;
    Ok(Arc::new(Argon2Passwords::with_params(params)?))
}

pub fn token_manager() -> Result<TokenManager> {
    Ok(TokenManager::new(SecretString::from(
        "integration-test-secret".to_string(),
    ))?)
}

pub struct Fixture {
    pub store: MemoryStore,
    pub cache: MemoryCache,
    pub passwords: Arc<Argon2Passwords>,
    pub service: Arc<AuthService>,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        Self::with_config(AuthConfig::new())
    }

    pub fn with_config(config: AuthConfig) -> Result<Self> {
        let store = MemoryStore::new();
        let cache = MemoryCache::new();
        let passwords = cheap_passwords()?;
        let service = AuthService::new(
            config,
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            token_manager()?,
            passwords.clone(),
        );
        Ok(Self {
            store,
            cache,
            passwords,
            service: Arc::new(service),
        })
    }

    /// Seed an active account whose password is [`PASSWORD`].
    pub async fn account(&self, id: AccountId, username: &str, role: Role) -> Result<Account> {
        let now = Utc::now();
        let account = Account {
            id,
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: self.passwords.hash(PASSWORD)?,
            role,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_account(account.clone()).await;
        Ok(account)
    }

    pub async fn membership(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        role: Role,
        last_login_at: Option<DateTime<Utc>>,
    ) -> TenantMembership {
        let membership = TenantMembership {
            tenant_id,
            account_id,
            tenant_name: format!("tenant-{tenant_id}"),
            role,
            status: Status::Active,
            last_login_at,
            created_at: Utc::now() - ChronoDuration::days(30) + ChronoDuration::seconds(tenant_id),
        };
        self.store.insert_membership(membership.clone()).await;
        membership
    }
}

/// Cache whose every call fails, as when Redis is unreachable.
pub struct FailingCache;

fn down() -> CacheError {
    CacheError::Backend("connection refused".to_string())
}

#[async_trait]
impl KeyValueCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(down())
    }
    async fn set(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        Err(down())
    }
    async fn delete(&self, _: &[String]) -> Result<(), CacheError> {
        Err(down())
    }
    async fn incr(&self, _: &str, _: Duration) -> Result<u64, CacheError> {
        Err(down())
    }
    async fn expire(&self, _: &str, _: Duration) -> Result<(), CacheError> {
        Err(down())
    }
    async fn ttl(&self, _: &str) -> Result<Option<Duration>, CacheError> {
        Err(down())
    }
    async fn set_add(&self, _: &str, _: &str) -> Result<(), CacheError> {
        Err(down())
    }
    async fn set_members(&self, _: &str) -> Result<Vec<String>, CacheError> {
        Err(down())
    }
    async fn set_remove(&self, _: &str, _: &str) -> Result<(), CacheError> {
        Err(down())
    }
}

/// Record store that stalls every call for `delay` before delegating.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub delay: Duration,
}

#[async_trait]
impl RecordStore for SlowStore {
    async fn find_account_by_username(&self, username: &str) -> Result<Account, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_account_by_username(username).await
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Account, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_account_by_email(email).await
    }

    async fn find_account_by_id(&self, id: AccountId) -> Result<Account, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_account_by_id(id).await
    }

    async fn find_memberships_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TenantMembership>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_memberships_for_account(account_id).await
    }

    async fn update_last_login_at(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.update_last_login_at(tenant_id, account_id).await
    }

    async fn update_password_hash(
        &self,
        account_id: AccountId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .update_password_hash(account_id, password_hash)
            .await
    }
}

/// Poll until the detached cache write after a rebuild has landed.
pub async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
