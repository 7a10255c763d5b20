//! Outcomes the auth core reports to its callers.

use std::time::Duration;
use thiserror::Error;

/// Message shared by every credential rejection so responses never reveal which
/// check failed.
pub const INVALID_CREDENTIALS: &str = "invalid credentials";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Locked out; only the retry delay is disclosed.
    #[error("too many attempts, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Malformed, expired, revoked, or no longer backed by an account.
    #[error("invalid or expired token")]
    TokenInvalid,
    /// Password was correct but the account has no usable tenant.
    #[error("no tenant available for this account")]
    NoTenantContext,
    #[error("insufficient permissions")]
    Forbidden,
    /// Record store failed or timed out; safe to retry.
    #[error("service temporarily unavailable")]
    DependencyUnavailable(String),
    #[error("internal error")]
    Internal(String),
}

impl AuthError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::DependencyUnavailable(_)
        )
    }
}
