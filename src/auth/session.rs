//! Session snapshot cache.
//!
//! Flow Overview:
//! 1) `put` writes the session JSON under `session:{account}:{credential}` and adds
//!    the credential id to `session:index:{account}`. The index outlives the
//!    payloads by a grace period so it never drops a live entry; its TTL is only
//!    ever extended, never shortened.
//! 2) `get` reads one payload. A payload that fails to decode reads as a miss.
//! 3) `invalidate_all` reads the index and deletes every listed payload plus the
//!    index itself in a single call.
//!
//! The two writes in `put` are not atomic. An index entry whose payload is gone is
//! harmless: it reads as a miss and disappears on the next bulk invalidation.

use super::types::{AccountId, Session};
use crate::cache::{BestEffortCache, CacheError};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_INDEX_GRACE: Duration = Duration::from_secs(60 * 60);

fn session_key(account_id: AccountId, credential_id: &str) -> String {
    format!("session:{account_id}:{credential_id}")
}

fn index_key(account_id: AccountId) -> String {
    format!("session:index:{account_id}")
}

#[derive(Clone)]
pub struct SessionCache {
    cache: BestEffortCache,
    index_grace: Duration,
}

impl SessionCache {
    #[must_use]
    pub fn new(cache: BestEffortCache) -> Self {
        Self {
            cache,
            index_grace: DEFAULT_INDEX_GRACE,
        }
    }

    #[must_use]
    pub fn with_index_grace(mut self, grace: Duration) -> Self {
        self.index_grace = grace;
        self
    }

    /// # Errors
    /// Returns the first cache error; the payload may be written without its index entry.
    pub async fn put(
        &self,
        account_id: AccountId,
        credential_id: &str,
        session: &Session,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(session)?;
        let index = index_key(account_id);

        self.cache
            .set(&session_key(account_id, credential_id), &payload, ttl)
            .await?;
        self.cache.set_add(&index, credential_id).await?;

        // A short-lived put must not shorten the index for its longer-lived siblings.
        let wanted = ttl + self.index_grace;
        let current = self.cache.ttl(&index).await?.unwrap_or_default();
        if current < wanted {
            self.cache.expire(&index, wanted).await?;
        }

        debug!(account_id, credential_id, "session cached");
        Ok(())
    }

    /// # Errors
    /// Returns the cache error; an undecodable payload is a miss, not an error.
    pub async fn get(
        &self,
        account_id: AccountId,
        credential_id: &str,
    ) -> Result<Option<Session>, CacheError> {
        let Some(payload) = self
            .cache
            .get(&session_key(account_id, credential_id))
            .await?
        else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!(account_id, credential_id, error = %err, "discarding undecodable session payload");
                Ok(None)
            }
        }
    }

    /// # Errors
    /// Returns the first cache error.
    pub async fn invalidate_one(
        &self,
        account_id: AccountId,
        credential_id: &str,
    ) -> Result<(), CacheError> {
        self.cache
            .delete(&[session_key(account_id, credential_id)])
            .await?;
        self.cache
            .set_remove(&index_key(account_id), credential_id)
            .await
    }

    /// Drop every indexed session for the account. An empty index is a no-op.
    ///
    /// # Errors
    /// Returns the cache error from reading the index or deleting the keys.
    pub async fn invalidate_all(&self, account_id: AccountId) -> Result<usize, CacheError> {
        let credential_ids = self.list_active(account_id).await?;
        if credential_ids.is_empty() {
            return Ok(0);
        }

        let mut keys: Vec<String> = credential_ids
            .iter()
            .map(|id| session_key(account_id, id))
            .collect();
        keys.push(index_key(account_id));
        self.cache.delete(&keys).await?;

        debug!(account_id, sessions = credential_ids.len(), "sessions invalidated");
        Ok(credential_ids.len())
    }

    /// # Errors
    /// Returns the cache error from reading the index.
    pub async fn list_active(&self, account_id: AccountId) -> Result<Vec<String>, CacheError> {
        self.cache.set_members(&index_key(account_id)).await
    }
}
