mod common;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER, WWW_AUTHENTICATE},
        Method, Request, StatusCode,
    },
    response::Response,
    Router,
};
use common::{Fixture, PASSWORD};
use serde_json::{json, Value};
use std::time::Duration;
use tessera::{
    api,
    auth::{AuthConfig, RateLimitPolicy, Role},
};
use tower::ServiceExt;

fn json_request(method: Method, uri: &str, token: Option<&str>, body: &Value) -> Result<Request<Body>> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    Ok(builder.body(Body::from(body.to_string()))?)
}

fn bare_request(method: Method, uri: &str, token: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    Ok(builder.body(Body::empty())?)
}

async fn body_json(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn seeded(config: AuthConfig) -> Result<(Fixture, Router)> {
    let fx = Fixture::with_config(config)?;
    fx.account(1, "alice", Role::User).await?;
    fx.membership(10, 1, Role::User, None).await;
    let app = api::router(fx.service.clone());
    Ok((fx, app))
}

async fn login(app: &Router) -> Result<String> {
    let request = json_request(
        Method::POST,
        "/v1/auth/login",
        None,
        &json!({ "username": "alice", "password": PASSWORD }),
    )?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    body["access_token"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("login response without access_token"))
}

#[tokio::test]
async fn health_reports_package() -> Result<()> {
    let (_fx, app) = seeded(AuthConfig::new()).await?;
    let response = app.oneshot(bare_request(Method::GET, "/health", None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}

#[tokio::test]
async fn login_returns_tokens_and_tenant() -> Result<()> {
    let (_fx, app) = seeded(AuthConfig::new()).await?;
    let request = json_request(
        Method::POST,
        "/v1/auth/login",
        None,
        &json!({ "username": "alice", "password": PASSWORD }),
    )?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await?;
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["current_tenant"]["tenant_id"], 10);
    assert_eq!(body["is_global_admin"], false);
    assert!(body.get("password_hash").is_none());
    assert!(body["account"].get("password_hash").is_none());
    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_input() -> Result<()> {
    let (_fx, app) = seeded(AuthConfig::new()).await?;

    let wrong = json_request(
        Method::POST,
        "/v1/auth/login",
        None,
        &json!({ "username": "alice", "password": "wrong" }),
    )?;
    let response = app.clone().oneshot(wrong).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await?;
    assert_eq!(body["error"], "invalid credentials");

    let empty = json_request(
        Method::POST,
        "/v1/auth/login",
        None,
        &json!({ "username": " ", "password": "" }),
    )?;
    let response = app.clone().oneshot(empty).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = bare_request(Method::POST, "/v1/auth/login", None)?;
    let response = app.oneshot(missing).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn oversized_login_body_is_refused() -> Result<()> {
    let (_fx, app) = seeded(AuthConfig::new()).await?;
    let request = json_request(
        Method::POST,
        "/v1/auth/login",
        None,
        &json!({ "username": "alice", "password": "x".repeat(128 * 1024) }),
    )?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(response).await?;
    assert_eq!(body["error"], "payload too large");
    Ok(())
}

#[tokio::test]
async fn lockout_sets_retry_after() -> Result<()> {
    let config = AuthConfig::new().with_username_limit(RateLimitPolicy {
        max_attempts: 2,
        window: Duration::from_secs(60),
        lockout: Duration::from_secs(120),
    });
    let (_fx, app) = seeded(config).await?;

    for _ in 0..2 {
        let request = json_request(
            Method::POST,
            "/v1/auth/login",
            None,
            &json!({ "username": "alice", "password": "wrong" }),
        )?;
        let response = app.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let request = json_request(
        Method::POST,
        "/v1/auth/login",
        None,
        &json!({ "username": "alice", "password": PASSWORD }),
    )?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    assert!((1..=120).contains(&retry_after));
    Ok(())
}

#[tokio::test]
async fn session_requires_bearer() -> Result<()> {
    let (_fx, app) = seeded(AuthConfig::new()).await?;

    let response = app
        .clone()
        .oneshot(bare_request(Method::GET, "/v1/auth/session", None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(WWW_AUTHENTICATE));

    let response = app
        .oneshot(bare_request(Method::GET, "/v1/auth/session", Some("garbage"))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn session_then_logout_then_rejected() -> Result<()> {
    let (_fx, app) = seeded(AuthConfig::new()).await?;
    let token = login(&app).await?;

    let response = app
        .clone()
        .oneshot(bare_request(Method::GET, "/v1/auth/session", Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["cached"], true);
    assert_eq!(body["session"]["tenant_id"], 10);

    let response = app
        .clone()
        .oneshot(bare_request(Method::POST, "/v1/auth/logout", Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(bare_request(Method::GET, "/v1/auth/session", Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn sessions_can_be_listed_and_revoked() -> Result<()> {
    let (fx, app) = seeded(AuthConfig::new()).await?;
    let token = login(&app).await?;
    let other = login(&app).await?;
    let other_id = fx.service.tokens().parse(&other)?.jti;

    let response = app
        .clone()
        .oneshot(bare_request(Method::GET, "/v1/auth/sessions", Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    let listed = body["sessions"].as_array().map_or(0, Vec::len);
    assert_eq!(listed, 2);

    let uri = format!("/v1/auth/sessions/{other_id}");
    let response = app
        .clone()
        .oneshot(bare_request(Method::DELETE, &uri, Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(bare_request(Method::DELETE, &uri, Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(bare_request(Method::GET, "/v1/auth/session", Some(&other))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn password_change_over_http() -> Result<()> {
    let (_fx, app) = seeded(AuthConfig::new()).await?;
    let token = login(&app).await?;

    let empty = json_request(
        Method::PUT,
        "/v1/auth/password",
        Some(&token),
        &json!({ "current_password": PASSWORD, "new_password": "" }),
    )?;
    let response = app.clone().oneshot(empty).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let change = json_request(
        Method::PUT,
        "/v1/auth/password",
        Some(&token),
        &json!({ "current_password": PASSWORD, "new_password": "rotated secret" }),
    )?;
    let response = app.clone().oneshot(change).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(bare_request(Method::GET, "/v1/auth/session", Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let (_fx, app) = seeded(AuthConfig::new()).await?;
    let response = app
        .oneshot(bare_request(Method::GET, "/api-docs/openapi.json", None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert!(body["paths"].get("/v1/auth/login").is_some());
    Ok(())
}
