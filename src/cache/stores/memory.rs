//! # In-Memory Cache Store
//!
//! Process-local store over a concurrent map. Expired entries are dropped
//! lazily on read and swept periodically by a background task so a cold
//! key cannot pin memory forever. Lost on restart by nature.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::debug;

use super::{CacheStore, CacheStoreStats};
use crate::cache::entry::CacheEntry;
use crate::cache::key::CacheKey;
use crate::core::error::AnycacheResult;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// In-memory cache store
pub struct MemoryStore {
    entries: Arc<DashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_cleanups: Arc<AtomicU64>,
    _sweeper: tokio::task::JoinHandle<()>,
}

impl MemoryStore {
    /// Create a store with the given sweep interval
    ///
    /// Must be called from within a tokio runtime; the sweeper task is
    /// spawned immediately.
    pub fn new(sweep_interval: Duration) -> Self {
        let entries: Arc<DashMap<String, CacheEntry>> = Arc::new(DashMap::new());
        let expired_cleanups = Arc::new(AtomicU64::new(0));

        let sweeper = {
            let entries = entries.clone();
            let expired_cleanups = expired_cleanups.clone();
            tokio::spawn(async move {
                let mut ticker = interval(sweep_interval);
                loop {
                    ticker.tick().await;
                    let before = entries.len();
                    entries.retain(|_, entry| !entry.is_expired());
                    let swept = before.saturating_sub(entries.len());
                    if swept > 0 {
                        expired_cleanups.fetch_add(swept as u64, Ordering::Relaxed);
                        debug!(swept, "swept expired in-memory entries");
                    }
                }
            })
        };

        Self {
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_cleanups,
            _sweeper: sweeper,
        }
    }

    /// Create a store with the default sweep interval
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        // The sweeper holds a clone of the map; stop it so the entries
        // can actually be freed
        self._sweeper.abort();
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> AnycacheResult<Option<CacheEntry>> {
        if let Some(entry) = self.entries.get(key.as_str()) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key.as_str());
                self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(entry.clone()));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> AnycacheResult<()> {
        self.entries.insert(key.as_str().to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> AnycacheResult<bool> {
        Ok(self.entries.remove(key.as_str()).is_some())
    }

    async fn clear(&self) -> AnycacheResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn stats(&self) -> AnycacheResult<CacheStoreStats> {
        Ok(CacheStoreStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> AnycacheResult<bool> {
        Ok(true)
    }
}
