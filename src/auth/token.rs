//! Access and refresh credentials.
//!
//! Credentials are HS256 JWTs (via `jsonwebtoken`) signed with one process-wide secret. They are
//! self-contained: signature and expiry are checked without any server state.
//! Revocation is a separate lookup, see [`super::revocation`].
//!
//! Access tokens carry `{account_id, tenant_id, role, iat, exp, jti, iss, use}`.
//! Refresh tokens carry no tenant or role and live longer. The `use` claim keeps
//! one kind from being accepted as the other.

use super::types::{AccountId, Role, TenantId};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{
    errors::{Error as JwtError, ErrorKind},
    Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use ulid::Ulid;

pub const ISSUER: &str = "tessera";
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("unsupported algorithm")]
    UnsupportedAlg,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("token used for the wrong purpose")]
    WrongUse,
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    InvalidKey,
    #[error("failed to encode token: {0}")]
    Encode(JwtError),
}

impl From<JwtError> for TokenError {
    fn from(err: JwtError) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => Self::UnsupportedAlg,
            _ => Self::TokenFormat,
        }
    }
}

/// How a rejected token failed. Callers treat both the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenRejection {
    Malformed,
    Expired,
}

impl TokenError {
    #[must_use]
    pub const fn rejection(&self) -> TokenRejection {
        match self {
            Self::Expired => TokenRejection::Expired,
            _ => TokenRejection::Malformed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

trait Claims {
    fn token_use(&self) -> TokenUse;
    fn exp(&self) -> i64;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub account_id: AccountId,
    pub tenant_id: TenantId,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: String,
    #[serde(rename = "use")]
    pub token_use: TokenUse,
}

impl AccessClaims {
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Validity left at `now`, `None` once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let seconds = self.exp - now.timestamp();
        u64::try_from(seconds)
            .ok()
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }
}

impl Claims for AccessClaims {
    fn token_use(&self) -> TokenUse {
        self.token_use
    }
    fn exp(&self) -> i64 {
        self.exp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub account_id: AccountId,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: String,
    #[serde(rename = "use")]
    pub token_use: TokenUse,
}

impl Claims for RefreshClaims {
    fn token_use(&self) -> TokenUse {
        self.token_use
    }
    fn exp(&self) -> i64 {
        self.exp
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub credential_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Stable fingerprint of a token string, used as the blacklist key.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..16])
}

/// Random 256-bit secret, base64url encoded.
#[must_use]
pub fn random_secret() -> SecretString {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    SecretString::from(Base64UrlUnpadded::encode_string(&bytes))
}

/// Issues and validates credentials. Cheap to share behind an `Arc`; the keys are
/// never mutated after construction.
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// # Errors
    /// Returns [`TokenError::InvalidKey`] if the secret is empty.
    pub fn new(secret: SecretString) -> Result<Self, TokenError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.is_empty() {
            return Err(TokenError::InvalidKey);
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            issuer: ISSUER.to_string(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        })
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(TokenError::Encode)
    }

    // Expiry is checked against the caller's clock, not the library's.
    fn verify<T: DeserializeOwned + Claims>(
        &self,
        token: &str,
        expected_use: TokenUse,
        now: i64,
    ) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<T>(token, &self.decoding_key, &validation)?.claims;
        if claims.token_use() != expected_use {
            return Err(TokenError::WrongUse);
        }
        if claims.exp() <= now {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(
        &self,
        account_id: AccountId,
        tenant_id: TenantId,
        role: Role,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(account_id, tenant_id, role, Utc::now())
    }

    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_at(
        &self,
        account_id: AccountId,
        tenant_id: TenantId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let claims = AccessClaims {
            account_id,
            tenant_id,
            role,
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_seconds(self.access_ttl),
            jti: Ulid::new().to_string(),
            iss: self.issuer.clone(),
            token_use: TokenUse::Access,
        };
        let token = self.sign(&claims)?;
        Ok(IssuedToken {
            expires_at: claims.expires_at(),
            credential_id: claims.jti,
            token,
        })
    }

    /// # Errors
    /// Returns an error if the token is malformed, forged, or expired.
    pub fn parse(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.parse_at(token, Utc::now())
    }

    /// # Errors
    /// Returns an error if the token is malformed, forged, or expired at `now`.
    pub fn parse_at(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        self.verify(token, TokenUse::Access, now.timestamp())
    }

    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_refresh(&self, account_id: AccountId) -> Result<IssuedToken, TokenError> {
        self.issue_refresh_at(account_id, Utc::now())
    }

    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_refresh_at(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let claims = RefreshClaims {
            account_id,
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_seconds(self.refresh_ttl),
            jti: Ulid::new().to_string(),
            iss: self.issuer.clone(),
            token_use: TokenUse::Refresh,
        };
        let token = self.sign(&claims)?;
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(IssuedToken {
            credential_id: claims.jti,
            token,
            expires_at,
        })
    }

    /// # Errors
    /// Returns an error if the token is malformed, forged, expired, or an access token.
    pub fn parse_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.parse_refresh_at(token, Utc::now())
    }

    /// # Errors
    /// Returns an error if the token is malformed, forged, expired at `now`, or an access token.
    pub fn parse_refresh_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshClaims, TokenError> {
        self.verify(token, TokenUse::Refresh, now.timestamp())
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2)
}
