pub mod auth;
pub mod health;
pub mod principal;

pub use self::health::health;
