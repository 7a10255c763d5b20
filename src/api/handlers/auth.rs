//! Login, logout, password and session endpoints.

use super::principal::{extract_bearer_token, extract_client_ip, AuthSession, ErrorResponse};
use crate::auth::{AuthError, AuthService, LoginResult, Session, SessionSource};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub credential_id: String,
    pub expires_at: DateTime<Utc>,
    /// `true` when the session was served from the cache.
    pub cached: bool,
    pub session: Session,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionListResponse {
    /// Credential id of the calling session.
    pub current: String,
    pub sessions: Vec<String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

/// Oversized bodies keep their 413; anything else unreadable is a 400.
fn rejected_payload(rejection: &JsonRejection) -> Response {
    match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => {
            error_response(StatusCode::PAYLOAD_TOO_LARGE, "payload too large")
        }
        _ => bad_request("missing or malformed payload"),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResult),
        (status = 400, description = "Missing or empty credentials", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 403, description = "No tenant available for this account", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 503, description = "Record store unavailable", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    auth: Extension<Arc<AuthService>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_payload(&rejection),
    };
    if request.username.trim().is_empty() || request.password.is_empty() {
        return bad_request("username and password are required");
    }

    let client_address = extract_client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    match auth
        .login(&request.username, &request.password, client_address.as_deref())
        .await
    {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Credential revoked"),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(auth: Extension<Arc<AuthService>>, headers: HeaderMap) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return AuthError::TokenInvalid.into_response();
    };
    match auth.logout(token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 204, description = "Every session of the account revoked"),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout_all(
    auth: Extension<Arc<AuthService>>,
    AuthSession(context): AuthSession,
) -> Response {
    match auth.logout_all(context.account_id()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed, every session revoked"),
        (status = 400, description = "Missing or empty password", body = ErrorResponse),
        (status = 401, description = "Invalid credential or current password", body = ErrorResponse),
        (status = 503, description = "Record store unavailable", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn change_password(
    auth: Extension<Arc<AuthService>>,
    AuthSession(context): AuthSession,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected_payload(&rejection),
    };
    if request.new_password.is_empty() {
        return bad_request("new password is required");
    }

    match auth
        .change_password(
            context.account_id(),
            &request.current_password,
            &request.new_password,
        )
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
        (status = 503, description = "Session could not be rebuilt", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn session(AuthSession(context): AuthSession) -> Json<SessionResponse> {
    Json(SessionResponse {
        credential_id: context.credential_id,
        expires_at: context.expires_at,
        cached: context.source == SessionSource::Cache,
        session: context.session,
    })
}

#[utoipa::path(
    get,
    path = "/v1/auth/sessions",
    responses(
        (status = 200, description = "Indexed sessions of the account", body = SessionListResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn sessions(
    auth: Extension<Arc<AuthService>>,
    AuthSession(context): AuthSession,
) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: auth.list_sessions(context.account_id()).await,
        current: context.credential_id,
    })
}

#[utoipa::path(
    delete,
    path = "/v1/auth/sessions/{credential_id}",
    params(
        ("credential_id" = String, Path, description = "Credential id of the session to revoke")
    ),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse),
        (status = 404, description = "No such session for this account"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn revoke_session(
    auth: Extension<Arc<AuthService>>,
    AuthSession(context): AuthSession,
    Path(credential_id): Path<String>,
) -> StatusCode {
    if auth
        .revoke_session(context.account_id(), &credential_id)
        .await
    {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
