//! # Tessera (multi-tenant identity and session core)
//!
//! `tessera` authenticates a principal, decides which tenant the principal is
//! acting within, issues a signed bearer credential and keeps revocable session
//! state for the requests that follow.
//!
//! ## Components
//!
//! - [`auth::rate_limit`]: failure counters and lockouts keyed by client address
//!   and by claimed username.
//! - [`auth::token`]: HS256 access and refresh credentials, plus the revocation
//!   blacklist in [`auth::revocation`].
//! - [`auth::session`]: cached session snapshots with a per-account index for bulk
//!   invalidation.
//! - [`auth::tenant`]: deterministic default-tenant selection at login.
//! - [`auth::service`]: the login orchestrator tying the pieces together.
//!
//! ## Collaborators
//!
//! Durable records live behind [`store::RecordStore`] (PostgreSQL in production)
//! and volatile state behind [`cache::KeyValueCache`] (Redis in production). The
//! cache is never the source of truth: every session can be rebuilt from the store,
//! and cache failures degrade to slower paths instead of failing requests.

pub mod api;
pub mod auth;
pub mod cache;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }
}
