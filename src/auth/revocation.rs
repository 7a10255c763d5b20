//! Credential blacklist.
//!
//! Entries live exactly as long as the credential they revoke would have, so the
//! blacklist never outgrows the set of still-valid tokens. Two keyings exist:
//! the token fingerprint (logout of the presented token) and the credential id
//! (bulk revocation of sessions found through the session index, where only the
//! id is known).

use super::token::{fingerprint, AccessClaims};
use crate::cache::{BestEffortCache, CacheError};
use std::time::Duration;
use tracing::debug;

const REVOKED: &str = "revoked";

fn token_key(token: &str) -> String {
    format!("blacklist:{}", fingerprint(token))
}

fn credential_key(credential_id: &str) -> String {
    format!("blacklist:jti:{credential_id}")
}

#[derive(Clone)]
pub struct RevocationList {
    cache: BestEffortCache,
}

impl RevocationList {
    #[must_use]
    pub fn new(cache: BestEffortCache) -> Self {
        Self { cache }
    }

    /// Blacklist `token` for `remaining`. A zero TTL means the token already
    /// expired and is skipped.
    ///
    /// # Errors
    /// Returns the cache error when the entry could not be written.
    pub async fn revoke(&self, token: &str, remaining: Duration) -> Result<(), CacheError> {
        if remaining.is_zero() {
            debug!("token already expired, skipping blacklist write");
            return Ok(());
        }
        self.cache.set(&token_key(token), REVOKED, remaining).await
    }

    /// # Errors
    /// Returns the cache error when the entry could not be written.
    pub async fn revoke_credential(
        &self,
        credential_id: &str,
        remaining: Duration,
    ) -> Result<(), CacheError> {
        if remaining.is_zero() {
            return Ok(());
        }
        self.cache
            .set(&credential_key(credential_id), REVOKED, remaining)
            .await
    }

    /// Whether the presented token is blacklisted under either keying.
    ///
    /// Lookup failures read as "not revoked": the signature and expiry checks have
    /// already passed, and cache outages must not lock every caller out.
    pub async fn is_revoked(&self, token: &str, claims: &AccessClaims) -> bool {
        let token_key = token_key(token);
        let credential_key = credential_key(&claims.jti);
        let (by_token, by_credential) = tokio::join!(
            self.cache.get(&token_key),
            self.cache.get(&credential_key)
        );

        BestEffortCache::read_or("get", by_token, None).is_some()
            || BestEffortCache::read_or("get", by_credential, None).is_some()
    }
}
