//! # File Cache Store
//!
//! One file per entry under a root directory, named by the SHA-256 of the
//! cache key. Writes go to a temporary file first and are renamed into
//! place, so a reader can never observe a partially written entry and an
//! abandoned write leaves nothing behind under the final name.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::{CacheStore, CacheStoreStats};
use crate::cache::entry::CacheEntry;
use crate::cache::key::CacheKey;
use crate::core::error::{AnycacheError, AnycacheResult};

const ENTRY_SUFFIX: &str = ".entry";

/// On-disk key-value store
pub struct FileStore {
    root: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_cleanups: AtomicU64,
}

impl FileStore {
    /// Create the store, creating the root directory if needed
    pub async fn new<P: AsRef<Path>>(root: P) -> AnycacheResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| AnycacheError::backend("file", format!("create {}: {}", root.display(), e)))?;
        Ok(Self {
            root,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_cleanups: AtomicU64::new(0),
        })
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_str().as_bytes()));
        self.root.join(format!("{}{}", digest, ENTRY_SUFFIX))
    }

    async fn remove_entry(&self, path: &Path) -> AnycacheResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AnycacheError::backend("file", e.to_string())),
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &CacheKey) -> AnycacheResult<Option<CacheEntry>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => return Err(AnycacheError::backend("file", e.to_string())),
        };

        let entry = CacheEntry::from_bytes(&bytes)?;
        if entry.is_expired() {
            self.remove_entry(&path).await?;
            self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key_prefix = key.prefix(), "expired file entry removed");
            return Ok(None);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(entry))
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> AnycacheResult<()> {
        let path = self.path_for(key);
        let bytes = entry.to_bytes()?;

        // Write-then-rename keeps STORE atomic: the final name only ever
        // points at a complete entry
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| AnycacheError::backend("file", e.to_string()))?;
        match tokio::fs::rename(&tmp, &path).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(AnycacheError::backend("file", e.to_string()))
            }
        }
    }

    async fn delete(&self, key: &CacheKey) -> AnycacheResult<bool> {
        self.remove_entry(&self.path_for(key)).await
    }

    async fn clear(&self) -> AnycacheResult<()> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AnycacheError::backend("file", e.to_string()))?;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| AnycacheError::backend("file", e.to_string()))?
        {
            if item.file_name().to_string_lossy().ends_with(ENTRY_SUFFIX) {
                let _ = tokio::fs::remove_file(item.path()).await;
            }
        }
        Ok(())
    }

    async fn stats(&self) -> AnycacheResult<CacheStoreStats> {
        let mut entries = 0;
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AnycacheError::backend("file", e.to_string()))?;
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| AnycacheError::backend("file", e.to_string()))?
        {
            if item.file_name().to_string_lossy().ends_with(ENTRY_SUFFIX) {
                entries += 1;
            }
        }
        Ok(CacheStoreStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> AnycacheResult<bool> {
        let probe = self.root.join(".probe");
        tokio::fs::write(&probe, b"ok")
            .await
            .map_err(|e| AnycacheError::backend("file", e.to_string()))?;
        let _ = tokio::fs::remove_file(&probe).await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::unix_now;
    use crate::core::types::UpstreamResponse;
    use axum::http::{HeaderMap, StatusCode};
    use bytes::Bytes;
    use std::time::Duration;
    use tempfile::TempDir;

    fn entry(body: &[u8], ttl: Option<Duration>) -> CacheEntry {
        let response = UpstreamResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::copy_from_slice(body),
        );
        CacheEntry::from_response(&response, ttl)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let key = CacheKey::from_raw("example.org/https#GET/abc");

        let stored = entry(b"payload", Some(Duration::from_secs(60)));
        store.set(&key, stored.clone()).await.unwrap();

        let fetched = store.get(&key).await.unwrap().unwrap();
        assert_eq!(fetched, stored);

        assert!(store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_removed_on_read() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let key = CacheKey::from_raw("stale");

        let mut stale = entry(b"old", Some(Duration::from_secs(1)));
        stale.stored_at = unix_now() - 10;
        store.set(&key, stale).await.unwrap();

        assert!(store.get(&key).await.unwrap().is_none());
        // The file itself is gone, not just hidden
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.expired_cleanups, 1);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_after_set() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let key = CacheKey::from_raw("k");

        store.set(&key, entry(b"v", None)).await.unwrap();

        let mut names = Vec::new();
        let mut rd = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(item) = rd.next_entry().await.unwrap() {
            names.push(item.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(ENTRY_SUFFIX));
    }

    #[tokio::test]
    async fn test_clear_removes_entries() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        for i in 0..3 {
            store
                .set(&CacheKey::from_raw(format!("k{}", i)), entry(b"v", None))
                .await
                .unwrap();
        }
        assert_eq!(store.stats().await.unwrap().entries, 3);

        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap().entries, 0);
    }
}
