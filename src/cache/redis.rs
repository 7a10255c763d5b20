//! Redis backend for [`KeyValueCache`].

use super::{ttl_seconds, CacheError, KeyValueCache};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use tracing::{info, info_span, Instrument};

/// Redis connection shared by every request.
///
/// `ConnectionManager` multiplexes commands over one connection and reconnects on
/// failure, so cloning it per call is cheap.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect and verify the server answers `PING`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn span(operation: &'static str) -> tracing::Span {
    info_span!(
        "cache.command",
        db.system = "redis",
        db.operation = operation
    )
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).instrument(span("GET")).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds(ttl))
            .instrument(span("SETEX"))
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        conn.del::<_, ()>(keys).instrument(span("DEL")).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let mut conn = self.conn();
        let seconds = i64::try_from(ttl_seconds(window)).unwrap_or(i64::MAX);
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1_u64)
            .expire(key, seconds)
            .ignore()
            .query_async(&mut conn)
            .instrument(span("INCR"))
            .await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn();
        let seconds = i64::try_from(ttl_seconds(ttl)).unwrap_or(i64::MAX);
        conn.expire::<_, ()>(key, seconds)
            .instrument(span("EXPIRE"))
            .await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn();
        // -2 for a missing key, -1 for a key without expiry.
        let seconds: i64 = conn.ttl(key).instrument(span("TTL")).await?;
        Ok(u64::try_from(seconds).ok().map(Duration::from_secs))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let mut conn = self.conn();
        conn.sadd::<_, _, ()>(key, member)
            .instrument(span("SADD"))
            .await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn();
        let members: Vec<String> = conn.smembers(key).instrument(span("SMEMBERS")).await?;
        Ok(members)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let mut conn = self.conn();
        conn.srem::<_, _, ()>(key, member)
            .instrument(span("SREM"))
            .await?;
        Ok(())
    }
}
