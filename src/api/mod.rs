//! HTTP surface.
//!
//! Flow Overview:
//! 1) `new` connects the record store (PostgreSQL) and the cache (Redis, or the
//!    in-process cache when no Redis URL is configured).
//! 2) The pieces are assembled into one shared [`AuthService`].
//! 3) [`router`] wires the documented routes plus request-id, trace, CORS and body
//!    limit layers, and the server runs until ctrl-c or SIGTERM.

use crate::{
    auth::{Argon2Passwords, AuthConfig, AuthService, TokenManager},
    cache::{KeyValueCache, MemoryCache, RedisCache},
    cli::globals::GlobalArgs,
    store::PgStore,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, post, put},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use openapi::openapi;

use handlers::{auth, health};

const MAX_BODY_BYTES: usize = 64 * 1024;
const MEMORY_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Build the application router around a shared auth service.
#[must_use]
pub fn router(auth_service: Arc<AuthService>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/auth/logout-all", post(auth::logout_all))
        .route("/v1/auth/password", put(auth::change_password))
        .route("/v1/auth/session", get(auth::session))
        .route("/v1/auth/sessions", get(auth::sessions))
        .route(
            "/v1/auth/sessions/:credential_id",
            delete(auth::revoke_session),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_service)),
        )
}

/// Start the server
/// # Errors
/// Return error if a backend cannot be reached or the server fails to start
pub async fn new(
    port: u16,
    dsn: String,
    redis_url: Option<String>,
    globals: &GlobalArgs,
    auth_config: AuthConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(auth_config.store_timeout())
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let cache: Arc<dyn KeyValueCache> = if let Some(url) = redis_url {
        Arc::new(
            RedisCache::connect(&url)
                .await
                .context("Failed to connect to redis")?,
        )
    } else {
        warn!("No redis URL configured, using the in-process cache; state is not shared between instances");
        let memory = MemoryCache::new();
        let _sweeper = memory.spawn_sweeper(MEMORY_SWEEP_PERIOD);
        Arc::new(memory)
    };

    let tokens = TokenManager::new(globals.jwt_secret.clone()).context("Invalid JWT secret")?;
    let passwords = Argon2Passwords::new()?;

    let auth_service = Arc::new(AuthService::new(
        auth_config,
        Arc::new(PgStore::new(pool)),
        cache,
        tokens,
        Arc::new(passwords),
    ));

    let app = router(auth_service);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
