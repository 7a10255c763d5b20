use crate::{
    api,
    auth::{token::random_secret, AuthConfig},
    cli::globals::GlobalArgs,
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: Option<String>,
    pub jwt_secret: Option<SecretString>,
    pub auth_config: AuthConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a backend cannot be reached or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let jwt_secret = args.jwt_secret.unwrap_or_else(|| {
        warn!("No JWT secret configured, generated an ephemeral one; tokens will not survive a restart");
        random_secret()
    });
    let globals = GlobalArgs::new(jwt_secret);

    api::new(
        args.port,
        args.dsn,
        args.redis_url,
        &globals,
        args.auth_config,
    )
    .await
}

fn log_startup_args(args: &Args) {
    let config = &args.auth_config;
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_url(&args.dsn)),
        (
            "redis_url",
            args.redis_url
                .as_deref()
                .map_or_else(|| "in-process".to_string(), redact_url),
        ),
        ("jwt_secret_set", args.jwt_secret.is_some().to_string()),
        (
            "access_token_ttl",
            format!("{}s", config.access_token_ttl().as_secs()),
        ),
        ("session_ttl", format!("{}s", config.session_ttl().as_secs())),
        (
            "store_timeout",
            format!("{}ms", config.store_timeout().as_millis()),
        ),
        (
            "cache_timeout",
            format!("{}ms", config.cache_timeout().as_millis()),
        ),
        (
            "limits",
            format!(
                "address={} username={} lockout={}s",
                config.client_address_limit().max_attempts,
                config.username_limit().max_attempts,
                config.username_limit().lockout.as_secs()
            ),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-url".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "tessera {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
