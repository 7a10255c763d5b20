//! Default tenant selection at login.
//!
//! Administrators land in an administrative tenant. Among peers, the most
//! recently used tenant wins. Accounts that never logged in land in their oldest
//! membership. Every tie falls back to the lowest tenant id, so the result is a
//! pure function of the input set regardless of its order.

use super::types::{Role, TenantMembership};
use std::cmp::Reverse;

#[must_use]
pub fn select_default(memberships: &[TenantMembership]) -> Option<&TenantMembership> {
    let active: Vec<&TenantMembership> = memberships
        .iter()
        .filter(|m| m.status.is_active())
        .collect();

    if active.len() <= 1 {
        return active.into_iter().next();
    }

    let admins: Vec<&TenantMembership> = active
        .iter()
        .copied()
        .filter(|m| m.role == Role::TenantAdmin)
        .collect();
    let pool = if admins.is_empty() { active } else { admins };

    let most_recent = pool
        .iter()
        .copied()
        .filter_map(|m| m.last_login_at.map(|at| (m, at)))
        .max_by_key(|(m, at)| (*at, Reverse(m.tenant_id)))
        .map(|(m, _)| m);

    most_recent.or_else(|| {
        pool.iter()
            .copied()
            .min_by_key(|m| (m.created_at, m.tenant_id))
    })
}
