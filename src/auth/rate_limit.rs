//! Login admission control.
//!
//! Flow Overview:
//! 1) Before any credential lookup, the client address and the claimed username are
//!    checked for an active lockout. The first lockout found rejects the attempt.
//! 2) Each failed attempt increments a counter per key. The counter's window slides:
//!    every increment re-arms its expiry.
//! 3) When a counter reaches the policy maximum, a lockout flag is written with its
//!    own, longer TTL. Concurrent failures may each write it; the last TTL wins.
//! 4) A successful login deletes both counter and lockout for both keys.
//!
//! Cache reads fail open and cache writes are logged and dropped, so an unavailable
//! cache disables rate limiting instead of blocking logins.

use crate::cache::BestEffortCache;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitScope {
    ClientAddress,
    Username,
}

impl RateLimitScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientAddress => "addr",
            Self::Username => "user",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u64,
    pub window: Duration,
    pub lockout: Duration,
}

impl RateLimitPolicy {
    /// Coarse limit that catches guessing spread over many accounts from one address.
    pub const CLIENT_ADDRESS: Self = Self {
        max_attempts: 10,
        window: Duration::from_secs(60),
        lockout: Duration::from_secs(30 * 60),
    };

    /// Tight limit that catches targeted guessing regardless of source address.
    pub const USERNAME: Self = Self {
        max_attempts: 5,
        window: Duration::from_secs(60),
        lockout: Duration::from_secs(30 * 60),
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// The two keys a login attempt is admitted under.
#[derive(Clone, Copy, Debug)]
pub struct LoginAttempt<'a> {
    pub client_address: Option<&'a str>,
    pub username: &'a str,
}

impl LoginAttempt<'_> {
    fn keys(&self) -> [(RateLimitScope, Option<&str>); 2] {
        [
            (RateLimitScope::ClientAddress, self.client_address),
            (RateLimitScope::Username, Some(self.username)),
        ]
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_admission(&self, scope: RateLimitScope, key: &str) -> RateLimitDecision;

    async fn record_failure(&self, scope: RateLimitScope, key: &str);

    async fn clear(&self, scope: RateLimitScope, key: &str);

    /// Both keys must allow; the first lockout found wins.
    async fn admit(&self, attempt: &LoginAttempt<'_>) -> RateLimitDecision {
        for (scope, key) in attempt.keys() {
            if let Some(key) = key {
                let decision = self.check_admission(scope, key).await;
                if !decision.is_allowed() {
                    return decision;
                }
            }
        }
        RateLimitDecision::Allowed
    }

    async fn record_login_failure(&self, attempt: &LoginAttempt<'_>) {
        for (scope, key) in attempt.keys() {
            if let Some(key) = key {
                self.record_failure(scope, key).await;
            }
        }
    }

    async fn clear_login(&self, attempt: &LoginAttempt<'_>) {
        for (scope, key) in attempt.keys() {
            if let Some(key) = key {
                self.clear(scope, key).await;
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn check_admission(&self, _scope: RateLimitScope, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    async fn record_failure(&self, _scope: RateLimitScope, _key: &str) {}

    async fn clear(&self, _scope: RateLimitScope, _key: &str) {}
}

/// Rate limiter backed by the shared key-value cache.
#[derive(Clone)]
pub struct CacheRateLimiter {
    cache: BestEffortCache,
    client_address: RateLimitPolicy,
    username: RateLimitPolicy,
}

impl CacheRateLimiter {
    #[must_use]
    pub fn new(cache: BestEffortCache) -> Self {
        Self {
            cache,
            client_address: RateLimitPolicy::CLIENT_ADDRESS,
            username: RateLimitPolicy::USERNAME,
        }
    }

    #[must_use]
    pub fn with_client_address_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.client_address = policy;
        self
    }

    #[must_use]
    pub fn with_username_policy(mut self, policy: RateLimitPolicy) -> Self {
        self.username = policy;
        self
    }

    #[must_use]
    pub fn policy(&self, scope: RateLimitScope) -> RateLimitPolicy {
        match scope {
            RateLimitScope::ClientAddress => self.client_address,
            RateLimitScope::Username => self.username,
        }
    }
}

fn normalize_key(key: &str) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_lowercase())
    }
}

fn attempts_key(scope: RateLimitScope, key: &str) -> String {
    format!("login:{}:attempts:{key}", scope.as_str())
}

fn lock_key(scope: RateLimitScope, key: &str) -> String {
    format!("login:{}:locked:{key}", scope.as_str())
}

#[async_trait]
impl RateLimiter for CacheRateLimiter {
    async fn check_admission(&self, scope: RateLimitScope, key: &str) -> RateLimitDecision {
        let Some(key) = normalize_key(key) else {
            return RateLimitDecision::Allowed;
        };
        let lock = lock_key(scope, &key);

        let locked = BestEffortCache::read_or("get", self.cache.get(&lock).await, None);
        if locked.is_none() {
            return RateLimitDecision::Allowed;
        }

        let remaining = BestEffortCache::read_or("ttl", self.cache.ttl(&lock).await, None)
            .unwrap_or(self.policy(scope).lockout);

        debug!(scope = scope.as_str(), ?remaining, "login attempt rejected by lockout");
        RateLimitDecision::Limited {
            retry_after: remaining.max(Duration::from_secs(1)),
        }
    }

    async fn record_failure(&self, scope: RateLimitScope, key: &str) {
        let Some(key) = normalize_key(key) else {
            return;
        };
        let policy = self.policy(scope);

        let count = match self
            .cache
            .incr(&attempts_key(scope, &key), policy.window)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                BestEffortCache::absorb("incr", Err(err));
                return;
            }
        };

        if count >= policy.max_attempts {
            warn!(
                scope = scope.as_str(),
                attempts = count,
                lockout_seconds = policy.lockout.as_secs(),
                "login lockout engaged"
            );
            BestEffortCache::absorb(
                "set",
                self.cache
                    .set(&lock_key(scope, &key), "1", policy.lockout)
                    .await,
            );
        }
    }

    async fn clear(&self, scope: RateLimitScope, key: &str) {
        let Some(key) = normalize_key(key) else {
            return;
        };
        let keys = [lock_key(scope, &key), attempts_key(scope, &key)];
        BestEffortCache::absorb("delete", self.cache.delete(&keys).await);
    }
}
