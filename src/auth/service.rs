//! Login orchestrator.
//!
//! Flow Overview (login):
//! 1) `AdmissionChecked`: both rate-limit keys must allow before any lookup.
//! 2) `CredentialResolved`: username and email lookups run together; the username
//!    match wins. A missing account still pays for one hash verification.
//! 3) `Authenticated`: any credential failure records a failure for both keys and
//!    returns the uniform `InvalidCredentials`.
//! 4) `ContextResolved`: global admins skip tenants; everyone else needs a default
//!    tenant or the login fails with `NoTenantContext`.
//! 5) `TokenIssued`, then `SessionWarmed`: the session is cached synchronously so
//!    the first request after login is a cache hit. Warming failures are logged.
//! 6) The limiter is cleared for both keys.
//!
//! Flow Overview (each authenticated request):
//! parse, revocation check, cache lookup, and on a miss a rebuild from the store
//! whose cache write runs on a detached task.
//!
//! Store calls are bounded by `store_timeout` and fail the request; cache calls are
//! bounded by `cache_timeout` and degrade.

use super::error::AuthError;
use super::password::PasswordScheme;
use super::principal::{SessionContext, SessionSource};
use super::rate_limit::{CacheRateLimiter, LoginAttempt, RateLimitDecision, RateLimiter};
use super::revocation::RevocationList;
use super::session::SessionCache;
use super::state::AuthConfig;
use super::tenant::select_default;
use super::token::{AccessClaims, TokenError, TokenManager};
use super::types::{Account, AccountId, LoginResult, Session, TenantMembership, NO_TENANT};
use crate::cache::{BestEffortCache, KeyValueCache};
use crate::store::{RecordStore, StoreError};
use chrono::Utc;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Login states at which an attempt can be rejected, recorded on rejection logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginStage {
    AdmissionChecked,
    Authenticated,
    ContextResolved,
    TokenIssued,
}

pub struct AuthService {
    store: Arc<dyn RecordStore>,
    passwords: Arc<dyn PasswordScheme>,
    tokens: Arc<TokenManager>,
    limiter: Arc<dyn RateLimiter>,
    sessions: SessionCache,
    revocations: RevocationList,
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn KeyValueCache>,
        tokens: TokenManager,
        passwords: Arc<dyn PasswordScheme>,
    ) -> Self {
        let cache = BestEffortCache::new(cache).with_timeout(config.cache_timeout());
        let limiter = CacheRateLimiter::new(cache.clone())
            .with_client_address_policy(config.client_address_limit())
            .with_username_policy(config.username_limit());
        let tokens = tokens
            .with_access_ttl(config.access_token_ttl())
            .with_refresh_ttl(config.refresh_token_ttl());

        Self {
            store,
            passwords,
            tokens: Arc::new(tokens),
            limiter: Arc::new(limiter),
            sessions: SessionCache::new(cache.clone())
                .with_index_grace(config.session_index_grace()),
            revocations: RevocationList::new(cache),
            config,
        }
    }

    /// Replace the cache-backed limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.store_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(operation)),
        }
    }

    /// # Errors
    /// `RateLimited` while locked out, `InvalidCredentials` for any credential
    /// failure, `NoTenantContext` when no tenant is usable, and
    /// `DependencyUnavailable` when the record store fails.
    #[instrument(skip_all, fields(client_address = client_address.unwrap_or("-")))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client_address: Option<&str>,
    ) -> Result<LoginResult, AuthError> {
        let attempt = LoginAttempt {
            client_address,
            username,
        };

        if let RateLimitDecision::Limited { retry_after } = self.limiter.admit(&attempt).await {
            return Err(rejected(
                LoginStage::AdmissionChecked,
                AuthError::RateLimited { retry_after },
            ));
        }

        let account = match self.authenticate(username, password).await {
            Ok(account) => account,
            Err(AuthError::InvalidCredentials) => {
                self.limiter.record_login_failure(&attempt).await;
                return Err(rejected(
                    LoginStage::Authenticated,
                    AuthError::InvalidCredentials,
                ));
            }
            Err(err) => return Err(rejected(LoginStage::Authenticated, err)),
        };

        let session = self
            .login_context(&account)
            .await
            .map_err(|err| rejected(LoginStage::ContextResolved, err))?;

        let issued = self
            .tokens
            .issue(account.id, session.tenant_id, session.role)
            .map_err(|err| rejected(LoginStage::TokenIssued, signing_failed(&err)))?;
        let refresh = self
            .tokens
            .issue_refresh(account.id)
            .map_err(|err| rejected(LoginStage::TokenIssued, signing_failed(&err)))?;

        if let Err(err) = self
            .sessions
            .put(
                account.id,
                &issued.credential_id,
                &session,
                self.config.session_ttl(),
            )
            .await
        {
            warn!(account_id = account.id, error = %err, "failed to warm session cache");
        }

        self.limiter.clear_login(&attempt).await;

        info!(
            account_id = account.id,
            tenant_id = session.tenant_id,
            "login succeeded"
        );

        Ok(LoginResult {
            access_token: issued.token,
            expires_at: issued.expires_at,
            credential_id: issued.credential_id,
            refresh_token: refresh.token,
            current_tenant: session.current_tenant(),
            account: session.account,
            tenants: session.memberships,
            is_global_admin: session.is_global_admin,
        })
    }

    async fn authenticate(&self, identifier: &str, password: &str) -> Result<Account, AuthError> {
        // Both lookups always run so timing does not reveal which one matched.
        let (by_username, by_email) = tokio::join!(
            self.store_call(
                "find_account_by_username",
                self.store.find_account_by_username(identifier)
            ),
            self.store_call(
                "find_account_by_email",
                self.store.find_account_by_email(identifier)
            ),
        );

        let account = match (by_username, by_email) {
            (Ok(account), _) | (Err(StoreError::NotFound), Ok(account)) => Some(account),
            (Err(StoreError::NotFound), Err(StoreError::NotFound)) => None,
            (Err(StoreError::NotFound), Err(err)) | (Err(err), _) => {
                return Err(unavailable(&err));
            }
        };

        let stored_hash = account.as_ref().map(|a| a.password_hash.clone());
        let verified = self.verify_password(stored_hash, password).await?;

        match account {
            Some(account) if verified && account.status.is_active() => Ok(account),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn verify_password(
        &self,
        stored_hash: Option<String>,
        password: &str,
    ) -> Result<bool, AuthError> {
        let passwords = Arc::clone(&self.passwords);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || match stored_hash {
            Some(hash) => passwords.verify(&hash, &password),
            None => {
                passwords.verify_dummy(&password);
                false
            }
        })
        .await
        .map_err(|err| AuthError::Internal(format!("password verification task failed: {err}")))
    }

    async fn memberships(&self, account_id: AccountId) -> Result<Vec<TenantMembership>, StoreError> {
        self.store_call(
            "find_memberships_for_account",
            self.store.find_memberships_for_account(account_id),
        )
        .await
    }

    async fn login_context(&self, account: &Account) -> Result<Session, AuthError> {
        if account.is_global_admin() {
            // Global admins need no membership; a lookup failure only trims the list.
            let memberships = self.memberships(account.id).await.unwrap_or_else(|err| {
                warn!(account_id = account.id, error = %err, "failed to list memberships for global admin");
                Vec::new()
            });
            return Ok(Session::global(account, &memberships));
        }

        let memberships = self
            .memberships(account.id)
            .await
            .map_err(|err| unavailable(&err))?;
        let current = select_default(&memberships).ok_or(AuthError::NoTenantContext)?;

        if let Err(err) = self
            .store_call(
                "update_last_login_at",
                self.store.update_last_login_at(current.tenant_id, account.id),
            )
            .await
        {
            warn!(
                account_id = account.id,
                tenant_id = current.tenant_id,
                error = %err,
                "failed to record tenant login time"
            );
        }

        Ok(Session::tenant(account, current, &memberships))
    }

    /// Revoke the presented token for the rest of its lifetime and drop its cached
    /// session. Other sessions of the account stay valid.
    ///
    /// # Errors
    /// Returns `TokenInvalid` if the token does not parse.
    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.tokens.parse(token).map_err(|err| token_rejected(&err))?;

        let remaining = claims.remaining_at(Utc::now()).unwrap_or_default();
        if let Err(err) = self.revocations.revoke(token, remaining).await {
            error!(account_id = claims.account_id, error = %err, "failed to blacklist token on logout");
        }
        BestEffortCache::absorb(
            "invalidate_one",
            self.sessions
                .invalidate_one(claims.account_id, &claims.jti)
                .await,
        );

        info!(account_id = claims.account_id, "logged out");
        Ok(())
    }

    /// Revoke every indexed session of the account.
    ///
    /// # Errors
    /// Never fails today; cache problems are logged.
    #[instrument(skip(self))]
    pub async fn logout_all(&self, account_id: AccountId) -> Result<(), AuthError> {
        self.revoke_all(account_id).await;
        Ok(())
    }

    async fn revoke_all(&self, account_id: AccountId) {
        let credential_ids = match self.sessions.list_active(account_id).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(account_id, error = %err, "failed to read session index");
                Vec::new()
            }
        };

        for credential_id in &credential_ids {
            if let Err(err) = self
                .revocations
                .revoke_credential(credential_id, self.tokens.access_ttl())
                .await
            {
                warn!(account_id, credential_id = %credential_id, error = %err, "failed to blacklist credential");
            }
        }

        if let Err(err) = self.sessions.invalidate_all(account_id).await {
            warn!(account_id, error = %err, "failed to invalidate sessions");
        }
    }

    /// Verify the current password, store the new hash, then log out every device.
    /// Session cleanup failures are logged and never undo the password change.
    ///
    /// # Errors
    /// `InvalidCredentials` when the current password is wrong or the account is
    /// gone, `DependencyUnavailable` when the store fails.
    #[instrument(skip(self, old_password, new_password))]
    pub async fn change_password(
        &self,
        account_id: AccountId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let account = self
            .store_call("find_account_by_id", self.store.find_account_by_id(account_id))
            .await
            .map_err(|err| match err {
                StoreError::NotFound => AuthError::InvalidCredentials,
                err => unavailable(&err),
            })?;

        if !self
            .verify_password(Some(account.password_hash.clone()), old_password)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let passwords = Arc::clone(&self.passwords);
        let new_password = new_password.to_string();
        let new_hash = tokio::task::spawn_blocking(move || passwords.hash(&new_password))
            .await
            .map_err(|err| AuthError::Internal(format!("password hashing task failed: {err}")))?
            .map_err(|err| AuthError::Internal(err.to_string()))?;

        self.store_call(
            "update_password_hash",
            self.store.update_password_hash(account_id, &new_hash),
        )
        .await
        .map_err(|err| match err {
            StoreError::NotFound => AuthError::InvalidCredentials,
            err => unavailable(&err),
        })?;

        self.revoke_all(account_id).await;

        info!(account_id, "password changed, sessions revoked");
        Ok(())
    }

    /// Resolve the presented token into the session it stands for.
    ///
    /// # Errors
    /// `TokenInvalid` for malformed, expired or revoked tokens and for tokens
    /// whose account or tenant membership no longer backs them.
    /// `DependencyUnavailable` when a cache miss cannot be rebuilt from the store.
    #[instrument(skip_all)]
    pub async fn resolve_session(&self, token: &str) -> Result<SessionContext, AuthError> {
        let claims = self.tokens.parse(token).map_err(|err| token_rejected(&err))?;

        if self.revocations.is_revoked(token, &claims).await {
            debug!(account_id = claims.account_id, "revoked token presented");
            return Err(AuthError::TokenInvalid);
        }

        let cached = BestEffortCache::read_or(
            "session_get",
            self.sessions.get(claims.account_id, &claims.jti).await,
            None,
        );
        if let Some(session) = cached.filter(|s| matches_claims(s, &claims)) {
            return Ok(context(&claims, session, SessionSource::Cache));
        }

        let session = self.reconstruct(&claims).await?;
        self.repopulate(&claims, session.clone());

        Ok(context(&claims, session, SessionSource::Reconstructed))
    }

    async fn reconstruct(&self, claims: &AccessClaims) -> Result<Session, AuthError> {
        let account = match self
            .store_call(
                "find_account_by_id",
                self.store.find_account_by_id(claims.account_id),
            )
            .await
        {
            Ok(account) => account,
            Err(StoreError::NotFound) => return Err(AuthError::TokenInvalid),
            Err(err) => return Err(unavailable(&err)),
        };
        if !account.status.is_active() {
            return Err(AuthError::TokenInvalid);
        }

        let session = if claims.tenant_id == NO_TENANT {
            if !account.is_global_admin() {
                return Err(AuthError::TokenInvalid);
            }
            let memberships = self.memberships(account.id).await.unwrap_or_else(|err| {
                warn!(account_id = account.id, error = %err, "failed to list memberships for global admin");
                Vec::new()
            });
            Session::global(&account, &memberships)
        } else {
            let memberships = self
                .memberships(account.id)
                .await
                .map_err(|err| unavailable(&err))?;
            let current = memberships
                .iter()
                .find(|m| m.tenant_id == claims.tenant_id && m.status.is_active())
                .ok_or(AuthError::TokenInvalid)?;
            Session::tenant(&account, current, &memberships)
        };

        if matches_claims(&session, claims) {
            Ok(session)
        } else {
            debug!(account_id = account.id, "token role no longer matches membership");
            Err(AuthError::TokenInvalid)
        }
    }

    /// Write a rebuilt session back on a detached task; the request never waits.
    fn repopulate(&self, claims: &AccessClaims, session: Session) {
        let Some(remaining) = claims.remaining_at(Utc::now()) else {
            return;
        };
        let ttl = remaining.min(self.config.session_ttl());
        let sessions = self.sessions.clone();
        let account_id = claims.account_id;
        let credential_id = claims.jti.clone();

        tokio::spawn(
            async move {
                if let Err(err) = sessions.put(account_id, &credential_id, &session, ttl).await {
                    warn!(account_id, error = %err, "failed to repopulate session cache");
                }
            }
            .instrument(info_span!("session.repopulate")),
        );
    }

    /// Credential ids of the account's indexed sessions. Empty when the cache is down.
    pub async fn list_sessions(&self, account_id: AccountId) -> Vec<String> {
        BestEffortCache::read_or(
            "list_active",
            self.sessions.list_active(account_id).await,
            Vec::new(),
        )
    }

    /// Revoke one of the account's sessions by credential id. Returns `false` when
    /// the id is not among the account's indexed sessions.
    pub async fn revoke_session(&self, account_id: AccountId, credential_id: &str) -> bool {
        if !self
            .list_sessions(account_id)
            .await
            .iter()
            .any(|id| id == credential_id)
        {
            return false;
        }

        if let Err(err) = self
            .revocations
            .revoke_credential(credential_id, self.tokens.access_ttl())
            .await
        {
            warn!(account_id, credential_id, error = %err, "failed to blacklist credential");
        }
        BestEffortCache::absorb(
            "invalidate_one",
            self.sessions.invalidate_one(account_id, credential_id).await,
        );
        true
    }
}

fn matches_claims(session: &Session, claims: &AccessClaims) -> bool {
    session.account_id() == claims.account_id
        && session.tenant_id == claims.tenant_id
        && session.role == claims.role
}

fn context(claims: &AccessClaims, session: Session, source: SessionSource) -> SessionContext {
    SessionContext {
        credential_id: claims.jti.clone(),
        expires_at: claims.expires_at(),
        session,
        source,
    }
}

fn rejected(stage: LoginStage, err: AuthError) -> AuthError {
    debug!(?stage, error = %err, "login rejected");
    err
}

fn unavailable(err: &StoreError) -> AuthError {
    error!(error = %err, "record store unavailable");
    AuthError::DependencyUnavailable(err.to_string())
}

fn token_rejected(err: &TokenError) -> AuthError {
    debug!(rejection = ?err.rejection(), error = %err, "token rejected");
    AuthError::TokenInvalid
}

fn signing_failed(err: &TokenError) -> AuthError {
    error!(error = %err, "failed to sign credential");
    AuthError::Internal(err.to_string())
}

/// Whole seconds for a `Retry-After` header, never zero.
#[must_use]
pub fn retry_after_seconds(retry_after: Duration) -> u64 {
    retry_after.as_secs().max(1)
}
