//! Failure policy for cache access.
//!
//! Authentication must never depend on cache availability. Every call is bounded
//! by a timeout, and callers pick one of two policies per call site:
//!
//! - [`BestEffortCache::read_or`] turns an error or timeout into a fallback value
//!   (fail open for admission checks, miss for session lookups).
//! - [`BestEffortCache::absorb`] logs a failed write and moves on.
//!
//! Call sites that must report failure upward (bulk invalidation on password
//! change) use the bounded primitives directly and log at their own level.

use super::{CacheError, KeyValueCache};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::warn;

pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct BestEffortCache {
    inner: Arc<dyn KeyValueCache>,
    timeout: Duration,
}

impl BestEffortCache {
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueCache>) -> Self {
        Self {
            inner,
            timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(operation)),
        }
    }

    /// Resolve a fallible cache result to `fallback`, logging the failure.
    pub fn read_or<T>(operation: &'static str, result: Result<T, CacheError>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!(cache.operation = operation, error = %err, "cache read failed, degrading");
                fallback
            }
        }
    }

    /// Swallow a failed cache write after logging it.
    pub fn absorb(operation: &'static str, result: Result<(), CacheError>) {
        if let Err(err) = result {
            warn!(cache.operation = operation, error = %err, "cache write failed, ignoring");
        }
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.bounded("get", self.inner.get(key)).await
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.bounded("set", self.inner.set(key, value, ttl)).await
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        self.bounded("delete", self.inner.delete(keys)).await
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        self.bounded("incr", self.inner.incr(key, window)).await
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.bounded("expire", self.inner.expire(key, ttl)).await
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.bounded("ttl", self.inner.ttl(key)).await
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn set_add(&self, key: &str, member: &str) -> Result<(), CacheError> {
        self.bounded("set_add", self.inner.set_add(key, member)).await
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.bounded("set_members", self.inner.set_members(key)).await
    }

    /// # Errors
    /// Returns the backend error or [`CacheError::Timeout`].
    pub async fn set_remove(&self, key: &str, member: &str) -> Result<(), CacheError> {
        self.bounded("set_remove", self.inner.set_remove(key, member))
            .await
    }
}
