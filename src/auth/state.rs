//! Auth configuration.

use super::rate_limit::RateLimitPolicy;
use super::session::{DEFAULT_INDEX_GRACE, DEFAULT_SESSION_TTL};
use super::token::{DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL};
use crate::cache::best_effort::DEFAULT_CACHE_TIMEOUT;
use std::time::Duration;

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    session_ttl: Duration,
    session_index_grace: Duration,
    store_timeout: Duration,
    cache_timeout: Duration,
    client_address_limit: RateLimitPolicy,
    username_limit: RateLimitPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_token_ttl: DEFAULT_ACCESS_TTL,
            refresh_token_ttl: DEFAULT_REFRESH_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
            session_index_grace: DEFAULT_INDEX_GRACE,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            client_address_limit: RateLimitPolicy::CLIENT_ADDRESS,
            username_limit: RateLimitPolicy::USERNAME,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_session_index_grace(mut self, grace: Duration) -> Self {
        self.session_index_grace = grace;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_client_address_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.client_address_limit = policy;
        self
    }

    #[must_use]
    pub fn with_username_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.username_limit = policy;
        self
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_token_ttl
    }

    /// Cached sessions never outlive the credential they describe.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl.min(self.access_token_ttl)
    }

    #[must_use]
    pub fn session_index_grace(&self) -> Duration {
        self.session_index_grace
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    #[must_use]
    pub fn cache_timeout(&self) -> Duration {
        self.cache_timeout
    }

    #[must_use]
    pub fn client_address_limit(&self) -> RateLimitPolicy {
        self.client_address_limit
    }

    #[must_use]
    pub fn username_limit(&self) -> RateLimitPolicy {
        self.username_limit
    }
}
