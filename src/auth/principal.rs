//! Typed context of an authenticated request.
//!
//! Produced by `AuthService::resolve_session` and handed to handlers as a value,
//! so downstream code reads fields instead of looking things up by name.

use super::error::AuthError;
use super::types::{AccountId, Role, Session, TenantId};
use chrono::{DateTime, Utc};

/// Where a resolved session came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionSource {
    Cache,
    Reconstructed,
}

#[derive(Clone, Debug)]
pub struct SessionContext {
    pub credential_id: String,
    pub expires_at: DateTime<Utc>,
    pub session: Session,
    pub source: SessionSource,
}

impl SessionContext {
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.session.account_id()
    }

    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.session.tenant_id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.session.role
    }

    #[must_use]
    pub fn is_global_admin(&self) -> bool {
        self.session.is_global_admin
    }

    /// Global admins pass every role check.
    ///
    /// # Errors
    /// Returns [`AuthError::Forbidden`] if the session role is not in `allowed`.
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AuthError> {
        if self.is_global_admin() || allowed.contains(&self.role()) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}
