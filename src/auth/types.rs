//! Identity, membership and session types shared across the auth core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

pub type AccountId = i64;
pub type TenantId = i64;

/// Tenant id carried by global-admin credentials that act outside any tenant.
pub const NO_TENANT: TenantId = 0;

#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    TenantAdmin,
    SuperAdmin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::TenantAdmin => "tenant_admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "tenant_admin" => Ok(Self::TenantAdmin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Disabled,
}

impl Status {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Account record as held by the record store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn is_global_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    #[must_use]
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Account fields that are safe to hand back to callers and to cache.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AccountProfile {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An account's membership in a tenant, joined with the tenant name.
///
/// `last_login_at` is `None` until the account first logs into this tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub tenant_name: String,
    pub role: Role,
    pub status: Status,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TenantMembership {
    #[must_use]
    pub fn summary(&self) -> TenantSummary {
        TenantSummary {
            tenant_id: self.tenant_id,
            tenant_name: self.tenant_name.clone(),
            role: self.role,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TenantSummary {
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub role: Role,
}

/// Resolved identity and tenant context for one credential.
///
/// Cached under `(account_id, credential_id)` and rebuilt from the record store on a
/// miss, so it must only contain data derivable from the store.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub account: AccountProfile,
    pub tenant_id: TenantId,
    pub tenant_name: String,
    pub role: Role,
    pub memberships: Vec<TenantSummary>,
    pub is_global_admin: bool,
}

impl Session {
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.account.id
    }

    /// Session for a global admin, bound to no tenant.
    #[must_use]
    pub fn global(account: &Account, memberships: &[TenantMembership]) -> Self {
        Self {
            account: account.profile(),
            tenant_id: NO_TENANT,
            tenant_name: String::new(),
            role: Role::SuperAdmin,
            memberships: memberships.iter().map(TenantMembership::summary).collect(),
            is_global_admin: true,
        }
    }

    /// Session bound to `current`, which must be one of `memberships`.
    #[must_use]
    pub fn tenant(
        account: &Account,
        current: &TenantMembership,
        memberships: &[TenantMembership],
    ) -> Self {
        Self {
            account: account.profile(),
            tenant_id: current.tenant_id,
            tenant_name: current.tenant_name.clone(),
            role: current.role,
            memberships: memberships.iter().map(TenantMembership::summary).collect(),
            is_global_admin: false,
        }
    }

    #[must_use]
    pub fn current_tenant(&self) -> Option<TenantSummary> {
        (self.tenant_id != NO_TENANT).then(|| TenantSummary {
            tenant_id: self.tenant_id,
            tenant_name: self.tenant_name.clone(),
            role: self.role,
        })
    }
}

/// Outcome of a successful login.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug)]
pub struct LoginResult {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub credential_id: String,
    pub refresh_token: String,
    pub account: AccountProfile,
    pub current_tenant: Option<TenantSummary>,
    pub tenants: Vec<TenantSummary>,
    pub is_global_admin: bool,
}
