//! # Cache Stores Module
//!
//! The storage backend adapter: one uniform async contract over pluggable
//! backends (in-process map, per-entry files, embedded SQLite, remote
//! Redis, remote object store). The variant is selected once at startup
//! from the resolved [`BackendHandle`] and held for the process lifetime.

pub mod file;
pub mod memory;
pub mod redis_store;
pub mod s3;
pub mod sqlite;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use s3::S3Store;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::entry::CacheEntry;
use crate::cache::key::CacheKey;
use crate::core::config::{BackendHandle, BackendUri};
use crate::core::error::AnycacheResult;

/// Uniform contract implemented by every storage backend
///
/// Entries are written wholesale or not at all; no backend ever exposes a
/// partially written entry. TTL handling is the entry's own bookkeeping
/// plus native expiry where the backend supports it (Redis, SQLite).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for logs and error context
    fn name(&self) -> &'static str;

    /// Fetch an entry; `None` on absence or backend-native expiry
    async fn get(&self, key: &CacheKey) -> AnycacheResult<Option<CacheEntry>>;

    /// Store an entry, replacing any previous one under the key
    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> AnycacheResult<()>;

    /// Delete an entry; returns whether one existed
    async fn delete(&self, key: &CacheKey) -> AnycacheResult<bool>;

    /// Remove every entry
    async fn clear(&self) -> AnycacheResult<()>;

    /// Current store statistics
    async fn stats(&self) -> AnycacheResult<CacheStoreStats>;

    /// Probe the backend with a basic round-trip or ping
    async fn health_check(&self) -> AnycacheResult<bool>;
}

/// Per-store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStoreStats {
    /// Number of stored entries
    pub entries: usize,

    /// Lookup hits
    pub hits: u64,

    /// Lookup misses
    pub misses: u64,

    /// Entries discarded on read because their TTL had elapsed
    pub expired_cleanups: u64,
}

/// Construct the store selected by the resolved backend handle
pub async fn build_store(handle: &BackendHandle) -> AnycacheResult<Arc<dyn CacheStore>> {
    let store: Arc<dyn CacheStore> = match &handle.uri {
        BackendUri::Memory => Arc::new(MemoryStore::with_defaults()),
        BackendUri::File(root) => Arc::new(FileStore::new(root).await?),
        BackendUri::Sqlite(path) => Arc::new(SqliteStore::open(path).await?),
        BackendUri::Redis(url) => {
            Arc::new(RedisStore::connect(url, &handle.redis_key_prefix).await?)
        }
        BackendUri::S3 { bucket, prefix } => Arc::new(S3Store::connect(bucket, prefix).await?),
    };
    Ok(store)
}
