//! # S3 Cache Store
//!
//! Remote object-store backend over the `object_store` crate: one object
//! per entry, named by the SHA-256 of the cache key under a configurable
//! prefix. Credentials, region, and endpoint come from the standard AWS
//! environment (`AWS_ACCESS_KEY_ID`, `AWS_REGION`, `AWS_ENDPOINT` for
//! S3-compatible stores like MinIO). Object stores have no native expiry,
//! so entries are checked lazily on read like the file backend; object
//! puts are atomic, a reader never sees a partial entry.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::{CacheStore, CacheStoreStats};
use crate::cache::entry::CacheEntry;
use crate::cache::key::CacheKey;
use crate::core::error::{AnycacheError, AnycacheResult};

const ENTRY_SUFFIX: &str = ".entry";

/// Object-store-backed cache store
pub struct S3Store {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_cleanups: AtomicU64,
}

impl S3Store {
    /// Connect to the bucket and verify it is listable
    pub async fn connect(bucket: &str, prefix: &str) -> AnycacheResult<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| AnycacheError::backend("s3", format!("bucket {}: {}", bucket, e)))?;

        let store = Self {
            store: Arc::new(store),
            prefix: prefix.trim_matches('/').to_string(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_cleanups: AtomicU64::new(0),
        };

        store.health_check().await?;
        info!(bucket, prefix = %store.prefix, "connected to s3 backend");
        Ok(store)
    }

    fn path_for(&self, key: &CacheKey) -> ObjectPath {
        let digest = hex::encode(Sha256::digest(key.as_str().as_bytes()));
        if self.prefix.is_empty() {
            ObjectPath::from(format!("{}{}", digest, ENTRY_SUFFIX))
        } else {
            ObjectPath::from(format!("{}/{}{}", self.prefix, digest, ENTRY_SUFFIX))
        }
    }

    fn list_prefix(&self) -> Option<ObjectPath> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(ObjectPath::from(self.prefix.clone()))
        }
    }
}

#[async_trait]
impl CacheStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn get(&self, key: &CacheKey) -> AnycacheResult<Option<CacheEntry>> {
        let path = self.path_for(key);
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => return Err(AnycacheError::backend("s3", e.to_string())),
        };

        let bytes = result
            .bytes()
            .await
            .map_err(|e| AnycacheError::backend("s3", e.to_string()))?;
        let entry = CacheEntry::from_bytes(&bytes)?;

        if entry.is_expired() {
            match self.store.delete(&path).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(AnycacheError::backend("s3", e.to_string())),
            }
            self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key_prefix = key.prefix(), "expired s3 entry removed");
            return Ok(None);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry))
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> AnycacheResult<()> {
        let path = self.path_for(key);
        let payload = PutPayload::from(Bytes::from(entry.to_bytes()?));
        self.store
            .put(&path, payload)
            .await
            .map_err(|e| AnycacheError::backend("s3", e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> AnycacheResult<bool> {
        // S3 itself reports success for missing keys; NotFound only
        // surfaces from stores that track existence
        match self.store.delete(&self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(AnycacheError::backend("s3", e.to_string())),
        }
    }

    async fn clear(&self) -> AnycacheResult<()> {
        let prefix = self.list_prefix();
        let locations: Vec<ObjectPath> = self
            .store
            .list(prefix.as_ref())
            .try_filter(|meta| {
                futures::future::ready(meta.location.as_ref().ends_with(ENTRY_SUFFIX))
            })
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .map_err(|e| AnycacheError::backend("s3", e.to_string()))?;

        for location in locations {
            self.store
                .delete(&location)
                .await
                .map_err(|e| AnycacheError::backend("s3", e.to_string()))?;
        }
        Ok(())
    }

    async fn stats(&self) -> AnycacheResult<CacheStoreStats> {
        let prefix = self.list_prefix();
        let entries = self
            .store
            .list(prefix.as_ref())
            .try_filter(|meta| {
                futures::future::ready(meta.location.as_ref().ends_with(ENTRY_SUFFIX))
            })
            .try_fold(0usize, |count, _| async move { Ok(count + 1) })
            .await
            .map_err(|e| AnycacheError::backend("s3", e.to_string()))?;

        Ok(CacheStoreStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> AnycacheResult<bool> {
        self.store
            .list_with_delimiter(self.list_prefix().as_ref())
            .await
            .map_err(|e| AnycacheError::backend("s3", e.to_string()))?;
        Ok(true)
    }
}
