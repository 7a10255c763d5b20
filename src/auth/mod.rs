pub mod error;
pub mod password;
pub mod principal;
pub mod rate_limit;
pub mod revocation;
pub mod service;
pub mod session;
pub mod state;
pub mod tenant;
pub mod token;
pub mod types;

pub use self::error::AuthError;
pub use self::password::{Argon2Passwords, PasswordScheme};
pub use self::principal::{SessionContext, SessionSource};
pub use self::rate_limit::{
    CacheRateLimiter, NoopRateLimiter, RateLimitDecision, RateLimitPolicy, RateLimiter,
};
pub use self::service::AuthService;
pub use self::state::AuthConfig;
pub use self::token::TokenManager;
pub use self::types::{
    Account, AccountId, LoginResult, Role, Session, Status, TenantId, TenantMembership,
    NO_TENANT,
};
