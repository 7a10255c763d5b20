//! Key-value cache abstraction.
//!
//! The cache holds rate-limit counters, lockout flags, revocation entries and
//! session snapshots. It offers no transactions across keys, so every multi-key
//! operation built on top of it must tolerate partial failure.
//!
//! Flow Overview:
//! 1) Backends implement [`KeyValueCache`] (Redis in production, [`MemoryCache`] for
//!    tests and single-instance deployments).
//! 2) The auth components never call a backend directly; they go through
//!    [`BestEffortCache`], which bounds every call with a timeout and decides how
//!    failures degrade.

pub mod best_effort;
pub mod memory;
pub mod redis;

pub use self::best_effort::BestEffortCache;
pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache operation `{0}` timed out")]
    Timeout(&'static str),
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Primitive operations every cache backend provides.
///
/// TTLs are whole seconds at the backend; sub-second durations round up so a key
/// never expires earlier than requested.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete every listed key in one round trip. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Atomically increment a counter and (re)arm its expiry, returning the new value.
    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Remaining lifetime of a key, `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CacheError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CacheError>;
}

/// Whole seconds for a backend TTL, never zero.
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    let secs = if ttl.subsec_nanos() > 0 { secs + 1 } else { secs };
    secs.max(1)
}
