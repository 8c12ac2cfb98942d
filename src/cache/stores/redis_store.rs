//! # Redis Cache Store
//!
//! Remote shared backend. Entries live under a configurable key prefix so
//! several services can share one Redis without colliding, and TTLs are
//! delegated to Redis itself via `SET EX`, so expiry needs no sweeper on
//! our side. The connection manager reconnects on its own; a dead Redis
//! surfaces as a backend error, not a panic.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::{CacheStore, CacheStoreStats};
use crate::cache::entry::CacheEntry;
use crate::cache::key::CacheKey;
use crate::core::error::{AnycacheError, AnycacheResult};

/// Redis-backed cache store
pub struct RedisStore {
    manager: ConnectionManager,
    key_prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisStore {
    /// Connect to Redis and verify the connection with a ping
    pub async fn connect(url: &str, key_prefix: &str) -> AnycacheResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AnycacheError::backend("redis", format!("invalid url: {}", e)))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AnycacheError::backend("redis", format!("connect: {}", e)))?;

        let store = Self {
            manager,
            key_prefix: key_prefix.to_string(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };

        if !store.health_check().await? {
            return Err(AnycacheError::backend("redis", "ping failed"));
        }
        info!(key_prefix = %store.key_prefix, "connected to redis backend");
        Ok(store)
    }

    fn full_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.key_prefix, key.as_str())
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &CacheKey) -> AnycacheResult<Option<CacheEntry>> {
        let mut conn = self.manager.clone();
        let bytes: Option<Vec<u8>> = conn
            .get(self.full_key(key))
            .await
            .map_err(|e| AnycacheError::backend("redis", e.to_string()))?;

        match bytes {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(CacheEntry::from_bytes(&bytes)?))
            }
            None => {
                // Expired keys are dropped by Redis itself, so absence
                // covers both never-stored and TTL elapsed
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> AnycacheResult<()> {
        let mut conn = self.manager.clone();
        let full_key = self.full_key(key);
        let bytes = entry.to_bytes()?;

        match entry.remaining_ttl() {
            Some(ttl) if ttl.as_secs() > 0 => {
                conn.set_ex::<_, _, ()>(&full_key, bytes, ttl.as_secs())
                    .await
                    .map_err(|e| AnycacheError::backend("redis", e.to_string()))?;
            }
            Some(_) => {
                // Already past its TTL; storing would be a no-op visible
                // to nobody
                debug!(key_prefix = key.prefix(), "skipping store of expired entry");
            }
            None => {
                conn.set::<_, _, ()>(&full_key, bytes)
                    .await
                    .map_err(|e| AnycacheError::backend("redis", e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> AnycacheResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .del(self.full_key(key))
            .await
            .map_err(|e| AnycacheError::backend("redis", e.to_string()))?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> AnycacheResult<()> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", self.key_prefix);

        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| AnycacheError::backend("redis", e.to_string()))?;

            if !keys.is_empty() {
                conn.del::<_, ()>(keys)
                    .await
                    .map_err(|e| AnycacheError::backend("redis", e.to_string()))?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(())
    }

    async fn stats(&self) -> AnycacheResult<CacheStoreStats> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", self.key_prefix);

        let mut entries = 0usize;
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| AnycacheError::backend("redis", e.to_string()))?;

            entries += keys.len();
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(CacheStoreStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_cleanups: 0,
        })
    }

    async fn health_check(&self) -> AnycacheResult<bool> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AnycacheError::backend("redis", e.to_string()))?;
        Ok(pong == "PONG")
    }
}
