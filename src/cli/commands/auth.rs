use crate::auth::{AuthConfig, RateLimitPolicy};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ACCESS_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_SESSION_TTL: &str = "session-ttl-seconds";
pub const ARG_STORE_TIMEOUT: &str = "store-timeout-ms";
pub const ARG_CACHE_TIMEOUT: &str = "cache-timeout-ms";
pub const ARG_ADDR_MAX_ATTEMPTS: &str = "client-address-max-attempts";
pub const ARG_USER_MAX_ATTEMPTS: &str = "username-max-attempts";
pub const ARG_FAILURE_WINDOW: &str = "failure-window-seconds";
pub const ARG_LOCKOUT: &str = "lockout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: Option<SecretString>,
    pub config: AuthConfig,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a duration or limit is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let seconds = |id: &str| -> anyhow::Result<Duration> {
            match matches.get_one::<u64>(id).copied() {
                Some(0) => anyhow::bail!("--{id} must be greater than zero"),
                Some(value) => Ok(Duration::from_secs(value)),
                None => anyhow::bail!("missing required argument: --{id}"),
            }
        };
        let millis = |id: &str| -> anyhow::Result<Duration> {
            match matches.get_one::<u64>(id).copied() {
                Some(0) => anyhow::bail!("--{id} must be greater than zero"),
                Some(value) => Ok(Duration::from_millis(value)),
                None => anyhow::bail!("missing required argument: --{id}"),
            }
        };
        let attempts = |id: &str| -> anyhow::Result<u64> {
            match matches.get_one::<u64>(id).copied() {
                Some(0) => anyhow::bail!("--{id} must be greater than zero"),
                Some(value) => Ok(value),
                None => anyhow::bail!("missing required argument: --{id}"),
            }
        };

        let window = seconds(ARG_FAILURE_WINDOW)?;
        let lockout = seconds(ARG_LOCKOUT)?;
        if lockout <= window {
            anyhow::bail!(
                "--{ARG_LOCKOUT} ({}s) must be longer than --{ARG_FAILURE_WINDOW} ({}s)",
                lockout.as_secs(),
                window.as_secs()
            );
        }

        let config = AuthConfig::new()
            .with_access_token_ttl(seconds(ARG_ACCESS_TTL)?)
            .with_refresh_token_ttl(seconds(ARG_REFRESH_TTL)?)
            .with_session_ttl(seconds(ARG_SESSION_TTL)?)
            .with_store_timeout(millis(ARG_STORE_TIMEOUT)?)
            .with_cache_timeout(millis(ARG_CACHE_TIMEOUT)?)
            .with_client_address_limit(RateLimitPolicy {
                max_attempts: attempts(ARG_ADDR_MAX_ATTEMPTS)?,
                window,
                lockout,
            })
            .with_username_limit(RateLimitPolicy {
                max_attempts: attempts(ARG_USER_MAX_ATTEMPTS)?,
                window,
                lockout,
            });

        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::from(v.clone()));

        Ok(Self { jwt_secret, config })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_limiter_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign access and refresh tokens")
                .long_help(
                    "HMAC secret used to sign access and refresh tokens.\n\nWhen unset a random secret is generated at startup, so tokens do not survive a restart and are not accepted by other instances.",
                )
                .env("TESSERA_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token lifetime in seconds")
                .env("TESSERA_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token lifetime in seconds")
                .env("TESSERA_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Cached session lifetime in seconds (capped by the access token lifetime)")
                .env("TESSERA_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT)
                .long(ARG_STORE_TIMEOUT)
                .help("Record store call timeout in milliseconds")
                .env("TESSERA_STORE_TIMEOUT_MS")
                .default_value("3000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_CACHE_TIMEOUT)
                .long(ARG_CACHE_TIMEOUT)
                .help("Cache call timeout in milliseconds")
                .env("TESSERA_CACHE_TIMEOUT_MS")
                .default_value("250")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_limiter_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADDR_MAX_ATTEMPTS)
                .long(ARG_ADDR_MAX_ATTEMPTS)
                .help("Failed logins per client address before lockout")
                .env("TESSERA_CLIENT_ADDRESS_MAX_ATTEMPTS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_USER_MAX_ATTEMPTS)
                .long(ARG_USER_MAX_ATTEMPTS)
                .help("Failed logins per username before lockout")
                .env("TESSERA_USERNAME_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_FAILURE_WINDOW)
                .long(ARG_FAILURE_WINDOW)
                .help("Window in seconds over which failures are counted")
                .env("TESSERA_FAILURE_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT)
                .long(ARG_LOCKOUT)
                .help("Lockout duration in seconds")
                .env("TESSERA_LOCKOUT_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(u64)),
        )
}
