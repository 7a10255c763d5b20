//! Request authentication and error mapping for the HTTP surface.
//!
//! Flow Overview: read the bearer credential, resolve it through the auth
//! service and hand the typed [`SessionContext`] to the handler. Every failure
//! becomes an [`AuthError`], rendered by its `IntoResponse` impl below.

use crate::auth::{service::retry_after_seconds, AuthError, AuthService, SessionContext};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        request::Parts,
        header::{AUTHORIZATION, RETRY_AFTER, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::InvalidCredentials | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::NoTenantContext | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut headers = HeaderMap::new();
        match &self {
            Self::RateLimited { retry_after } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds(*retry_after)));
            }
            Self::TokenInvalid => {
                headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, headers, body).into_response()
    }
}

/// Bearer credential from the `Authorization` header; the scheme is case-insensitive.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Client address for rate limiting: first `x-forwarded-for` hop, then `x-real-ip`,
/// then the socket peer.
pub(crate) fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

/// Resolve the request's bearer credential into a session, or fail with `TokenInvalid`.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    auth: &AuthService,
) -> Result<SessionContext, AuthError> {
    let token = extract_bearer_token(headers).ok_or(AuthError::TokenInvalid)?;
    auth.resolve_session(token).await
}

/// Extractor for handlers that need an authenticated caller.
pub struct AuthSession(pub SessionContext);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or_else(|| AuthError::Internal("auth service not configured".to_string()))?;
        require_auth(&parts.headers, &auth).await.map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::body::to_bytes;
    use std::time::Duration;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(
            extract_client_ip(&headers, None),
            Some("1.2.3.4".to_string())
        );
    }

    #[test]
    fn extract_client_ip_falls_back_to_peer() {
        let peer: SocketAddr = ([10, 0, 0, 7], 4242).into();
        assert_eq!(
            extract_client_ip(&HeaderMap::new(), Some(peer)),
            Some("10.0.0.7".to_string())
        );
        assert_eq!(extract_client_ip(&HeaderMap::new(), None), None);
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() -> Result<()> {
        let response = AuthError::RateLimited {
            retry_after: Duration::from_millis(1500),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from(1_u64))
        );

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let error: ErrorResponse = serde_json::from_slice(&body)?;
        assert_eq!(error.error, "too many attempts, retry in 1s");
        Ok(())
    }

    #[test]
    fn dependency_errors_do_not_leak_detail() {
        let response = AuthError::DependencyUnavailable("pg: connection reset".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let response = AuthError::TokenInvalid.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(WWW_AUTHENTICATE));
    }
}
