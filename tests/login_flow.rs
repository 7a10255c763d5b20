mod common;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use common::{FailingCache, Fixture, SlowStore, PASSWORD};
use std::{sync::Arc, time::Duration};
use tessera::{
    auth::{
        AuthConfig, AuthError, AuthService, NoopRateLimiter, RateLimitPolicy, Role, Status,
        NO_TENANT,
    },
    cache::{KeyValueCache, MemoryCache},
    store::MemoryStore,
};

#[tokio::test]
async fn login_resolves_admin_membership_and_warms_session() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(1, "alice", Role::User).await?;
    fx.membership(10, 1, Role::User, Some(Utc::now())).await;
    fx.membership(20, 1, Role::TenantAdmin, None).await;

    let result = fx.service.login("alice", PASSWORD, Some("10.0.0.1")).await?;

    let current = result.current_tenant.as_ref().map(|t| t.tenant_id);
    assert_eq!(current, Some(20));
    assert!(!result.is_global_admin);
    assert_eq!(result.tenants.len(), 2);
    assert!(!result.refresh_token.is_empty());

    let claims = fx.service.tokens().parse(&result.access_token)?;
    assert_eq!(claims.account_id, 1);
    assert_eq!(claims.tenant_id, 20);
    assert_eq!(claims.role, Role::TenantAdmin);
    assert_eq!(claims.jti, result.credential_id);

    // Warmed synchronously, so the payload is present before login returns.
    let key = format!("session:1:{}", result.credential_id);
    assert!(fx.cache.get(&key).await?.is_some());

    let membership = fx.store.membership(20, 1).await;
    assert!(membership.and_then(|m| m.last_login_at).is_some());
    Ok(())
}

#[tokio::test]
async fn login_accepts_email_and_is_case_insensitive() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(2, "bob", Role::User).await?;
    fx.membership(10, 2, Role::User, None).await;

    let by_email = fx.service.login("BOB@example.com", PASSWORD, None).await?;
    assert_eq!(by_email.account.id, 2);

    let by_name = fx.service.login("Bob", PASSWORD, None).await?;
    assert_eq!(by_name.account.id, 2);
    Ok(())
}

#[tokio::test]
async fn resolved_tenant_is_always_an_active_membership() -> Result<()> {
    let fx = Fixture::new()?;
    let now = Utc::now();
    for (id, memberships) in [
        (30, vec![(1, Role::User, None), (2, Role::User, Some(now))]),
        (31, vec![(3, Role::TenantAdmin, Some(now)), (4, Role::User, Some(now))]),
        (32, vec![(5, Role::User, None)]),
    ] {
        let username = format!("user{id}");
        fx.account(id, &username, Role::User).await?;
        let mut active = Vec::new();
        for (tenant_id, role, last) in memberships {
            fx.membership(tenant_id, id, role, last).await;
            active.push(tenant_id);
        }

        let result = fx.service.login(&username, PASSWORD, None).await?;
        let tenant_id = result.current_tenant.map(|t| t.tenant_id);
        assert!(tenant_id.is_some_and(|t| active.contains(&t)));
    }
    Ok(())
}

#[tokio::test]
async fn unknown_account_and_wrong_password_look_the_same() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(3, "carol", Role::User).await?;
    fx.membership(10, 3, Role::User, None).await;

    let missing = fx.service.login("nobody", PASSWORD, None).await;
    let wrong = fx.service.login("carol", "not the password", None).await;

    assert!(matches!(missing, Err(AuthError::InvalidCredentials)));
    assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
    if let (Err(a), Err(b)) = (missing, wrong) {
        assert_eq!(a.to_string(), b.to_string());
    }
    Ok(())
}

#[tokio::test]
async fn disabled_account_is_rejected_as_invalid_credentials() -> Result<()> {
    let fx = Fixture::new()?;
    let mut account = fx.account(4, "dave", Role::User).await?;
    fx.membership(10, 4, Role::User, None).await;
    account.status = Status::Disabled;
    fx.store.insert_account(account).await;

    let result = fx.service.login("dave", PASSWORD, None).await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    Ok(())
}

#[tokio::test]
async fn account_without_memberships_has_no_tenant_context() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(5, "erin", Role::User).await?;

    let result = fx.service.login("erin", PASSWORD, None).await;
    assert!(matches!(result, Err(AuthError::NoTenantContext)));
    Ok(())
}

#[tokio::test]
async fn global_admin_logs_in_without_tenant() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(6, "root", Role::SuperAdmin).await?;
    fx.membership(10, 6, Role::User, None).await;

    let result = fx.service.login("root", PASSWORD, None).await?;
    assert!(result.is_global_admin);
    assert!(result.current_tenant.is_none());
    assert_eq!(result.tenants.len(), 1);

    let claims = fx.service.tokens().parse(&result.access_token)?;
    assert_eq!(claims.tenant_id, NO_TENANT);
    assert_eq!(claims.role, Role::SuperAdmin);
    Ok(())
}

#[tokio::test]
async fn username_locks_after_max_failures_even_with_correct_password() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(7, "frank", Role::User).await?;
    fx.membership(10, 7, Role::User, None).await;

    let max = AuthConfig::new().username_limit().max_attempts;
    for attempt in 0..max {
        // Different addresses so only the username key accumulates.
        let address = format!("192.0.2.{attempt}");
        let result = fx.service.login("frank", "wrong", Some(&address)).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    let locked = fx.service.login("frank", PASSWORD, Some("198.51.100.1")).await;
    match locked {
        Err(AuthError::RateLimited { retry_after }) => {
            assert!(retry_after >= Duration::from_secs(1));
            assert!(retry_after <= Duration::from_secs(30 * 60));
        }
        other => panic!("expected lockout, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn client_address_lock_applies_across_usernames() -> Result<()> {
    let config = AuthConfig::new().with_client_address_limit(RateLimitPolicy {
        max_attempts: 3,
        window: Duration::from_secs(60),
        lockout: Duration::from_secs(600),
    });
    let fx = Fixture::with_config(config)?;
    fx.account(8, "grace", Role::User).await?;
    fx.membership(10, 8, Role::User, None).await;

    for name in ["x1", "x2", "x3"] {
        let result = fx.service.login(name, "guess", Some("203.0.113.9")).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    let result = fx.service.login("grace", PASSWORD, Some("203.0.113.9")).await;
    assert!(matches!(result, Err(AuthError::RateLimited { .. })));

    let elsewhere = fx.service.login("grace", PASSWORD, Some("203.0.113.10")).await;
    assert!(elsewhere.is_ok());
    Ok(())
}

#[tokio::test]
async fn successful_login_clears_prior_failures() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(9, "heidi", Role::User).await?;
    fx.membership(10, 9, Role::User, None).await;

    let max = AuthConfig::new().username_limit().max_attempts;
    for _ in 0..max - 1 {
        let _ = fx.service.login("heidi", "wrong", None).await;
    }
    assert!(fx.cache.get("login:user:attempts:heidi").await?.is_some());

    fx.service.login("heidi", PASSWORD, None).await?;
    assert!(fx.cache.get("login:user:attempts:heidi").await?.is_none());
    assert!(fx.cache.get("login:user:locked:heidi").await?.is_none());

    // The counter starts over: max - 1 new failures do not lock.
    for _ in 0..max - 1 {
        let _ = fx.service.login("heidi", "wrong", None).await;
    }
    assert!(fx.service.login("heidi", PASSWORD, None).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn no_tenant_context_is_not_counted_as_a_failure() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(11, "ivan", Role::User).await?;

    let result = fx.service.login("ivan", PASSWORD, None).await;
    assert!(matches!(result, Err(AuthError::NoTenantContext)));
    assert!(fx.cache.get("login:user:attempts:ivan").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn cache_outage_does_not_block_login() -> Result<()> {
    let store = MemoryStore::new();
    let seed = Fixture::new()?;
    let account = seed.account(12, "judy", Role::User).await?;
    let membership = seed.membership(10, 12, Role::User, None).await;
    store.insert_account(account).await;
    store.insert_membership(membership).await;

    let service = AuthService::new(
        AuthConfig::new(),
        Arc::new(store),
        Arc::new(FailingCache),
        common::token_manager()?,
        seed.passwords.clone(),
    );

    let result = service.login("judy", PASSWORD, Some("10.1.1.1")).await?;

    // No cached session, so resolution falls back to the store.
    let context = service.resolve_session(&result.access_token).await?;
    assert_eq!(context.account_id(), 12);
    assert_eq!(context.tenant_id(), 10);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn store_timeout_is_dependency_unavailable() -> Result<()> {
    let seed = Fixture::new()?;
    seed.account(13, "mallory", Role::User).await?;
    seed.membership(10, 13, Role::User, None).await;

    let store = SlowStore {
        inner: seed.store.clone(),
        delay: Duration::from_secs(10),
    };
    let service = AuthService::new(
        AuthConfig::new().with_store_timeout(Duration::from_secs(1)),
        Arc::new(store),
        Arc::new(MemoryCache::new()),
        common::token_manager()?,
        seed.passwords.clone(),
    )
    .with_rate_limiter(Arc::new(NoopRateLimiter));

    let result = service.login("mallory", PASSWORD, None).await;
    assert!(matches!(result, Err(AuthError::DependencyUnavailable(_))));
    assert!(result.err().is_some_and(|e| e.is_retryable()));
    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected() -> Result<()> {
    let fx = Fixture::new()?;
    fx.account(14, "niaj", Role::User).await?;
    fx.membership(10, 14, Role::User, None).await;

    let issued_long_ago = Utc::now() - ChronoDuration::days(8);
    let stale = fx
        .service
        .tokens()
        .issue_at(14, 10, Role::User, issued_long_ago)?;

    let result = fx.service.resolve_session(&stale.token).await;
    assert!(matches!(result, Err(AuthError::TokenInvalid)));
    Ok(())
}
