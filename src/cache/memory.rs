//! In-process [`KeyValueCache`] for tests and single-instance deployments.
//!
//! Expiry follows `tokio::time`, so tests can pause and advance the clock.
//! Expired keys are dropped when read, on every [`SWEEP_EVERY`]th write, and by
//! [`MemoryCache::spawn_sweeper`] when the server runs on this cache.

use super::{CacheError, KeyValueCache};
use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::debug;

/// Writes between two amortized sweeps.
pub const SWEEP_EVERY: usize = 1024;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, Entry>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired key, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Sweep on a fixed period until the returned handle is aborted.
    #[must_use]
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    debug!(evicted, "expired cache keys evicted");
                }
            }
        })
    }

    // Callers must not hold a map guard here; `retain` locks every shard.
    fn wrote(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % SWEEP_EVERY == 0 {
            self.evict_expired();
        }
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_live(now) {
            return Some(entry.clone());
        }
        drop(entry);
        self.entries.remove_if(key, |_, e| !e.is_live(now));
        None
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Backend(format!("value at `{key}` has the wrong type"))
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(value),
                ..
            }) => Ok(Some(value)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        self.wrote();
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let next = {
            let now = Instant::now();
            let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Text("0".to_string()),
                expires_at: None,
            });
            if !entry.is_live(now) {
                entry.value = Value::Text("0".to_string());
            }

            let current = match &entry.value {
                Value::Text(value) => value.parse::<u64>().map_err(|_| {
                    CacheError::Backend(format!("value at `{key}` is not an integer"))
                })?,
                Value::Set(_) => return Err(wrong_type(key)),
            };

            let next = current.saturating_add(1);
            entry.value = Value::Text(next.to_string());
            entry.expires_at = Some(now + window);
            next
        };
        self.wrote();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.is_live(now) {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Instant::now();
        Ok(self
            .live(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CacheError> {
        {
            let now = Instant::now();
            let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Set(BTreeSet::new()),
                expires_at: None,
            });
            if !entry.is_live(now) {
                entry.value = Value::Set(BTreeSet::new());
                entry.expires_at = None;
            }
            match &mut entry.value {
                Value::Set(members) => {
                    members.insert(member.to_string());
                }
                Value::Text(_) => return Err(wrong_type(key)),
            }
        }
        self.wrote();
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        match self.live(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.into_iter().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let emptied = match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::Set(members) => {
                    members.remove(member);
                    members.is_empty()
                }
                Value::Text(_) => return Err(wrong_type(key)),
            },
            None => false,
        };
        if emptied {
            self.entries
                .remove_if(key, |_, e| matches!(&e.value, Value::Set(m) if m.is_empty()));
        }
        Ok(())
    }
}
