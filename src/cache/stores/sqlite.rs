//! # SQLite Cache Store
//!
//! Embedded-database backend. A single `entries` table keyed by cache key
//! holds serialized entries with a native `expires_at` column, so expiry
//! is enforced in SQL on read. The connection lives behind a mutex and
//! every call is offloaded to the blocking pool; WAL mode keeps readers
//! from blocking the writer.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{CacheStore, CacheStoreStats};
use crate::cache::entry::{unix_now, CacheEntry};
use crate::cache::key::CacheKey;
use crate::core::error::{AnycacheError, AnycacheResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    key        TEXT PRIMARY KEY,
    value      BLOB NOT NULL,
    expires_at INTEGER
);
";

/// Embedded SQLite store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired_cleanups: AtomicU64,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize the schema
    pub async fn open<P: AsRef<Path>>(path: P) -> AnycacheResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let conn = Self::blocking(move || {
            let conn = Connection::open(&path)?;
            let _ = conn.execute("PRAGMA journal_mode = WAL", []);
            let _ = conn.execute("PRAGMA busy_timeout = 5000", []);
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_cleanups: AtomicU64::new(0),
        })
    }

    /// Open an in-memory database, mainly for tests
    pub async fn open_in_memory() -> AnycacheResult<Self> {
        let conn = Self::blocking(move || {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired_cleanups: AtomicU64::new(0),
        })
    }

    /// Run a rusqlite closure on the blocking pool
    async fn blocking<T, F>(f: F) -> AnycacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, rusqlite::Error> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| AnycacheError::internal(format!("sqlite task join: {}", e)))?
            .map_err(|e| AnycacheError::backend("sqlite", e.to_string()))
    }

    /// Same, against this store's connection
    async fn with_conn<T, F>(&self, f: F) -> AnycacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> AnycacheResult<T> {
            let conn = conn
                .lock()
                .map_err(|_| AnycacheError::backend("sqlite", "connection mutex poisoned"))?;
            f(&conn).map_err(|e| AnycacheError::backend("sqlite", e.to_string()))
        })
        .await
        .map_err(|e| AnycacheError::internal(format!("sqlite task join: {}", e)))?
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &CacheKey) -> AnycacheResult<Option<CacheEntry>> {
        let key_str = key.as_str().to_string();
        let now = unix_now() as i64;

        enum Row {
            Live(Vec<u8>),
            Expired,
            Absent,
        }

        let row = self
            .with_conn(move |conn| {
                let found: Option<(Vec<u8>, Option<i64>)> = conn
                    .query_row(
                        "SELECT value, expires_at FROM entries WHERE key = ?1",
                        params![key_str],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                match found {
                    Some((_, Some(expires_at))) if now >= expires_at => {
                        conn.execute("DELETE FROM entries WHERE key = ?1", params![key_str])?;
                        Ok(Row::Expired)
                    }
                    Some((value, _)) => Ok(Row::Live(value)),
                    None => Ok(Row::Absent),
                }
            })
            .await?;

        match row {
            Row::Live(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(CacheEntry::from_bytes(&bytes)?))
            }
            Row::Expired => {
                self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key_prefix = key.prefix(), "expired sqlite entry removed");
                Ok(None)
            }
            Row::Absent => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> AnycacheResult<()> {
        let key_str = key.as_str().to_string();
        let expires_at = entry.expires_at().map(|at| at as i64);
        let bytes = entry.to_bytes()?;

        self.with_conn(move |conn| {
            // Single INSERT OR REPLACE: the entry is replaced wholesale,
            // never partially updated
            conn.execute(
                "INSERT OR REPLACE INTO entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key_str, bytes, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &CacheKey) -> AnycacheResult<bool> {
        let key_str = key.as_str().to_string();
        let deleted = self
            .with_conn(move |conn| {
                conn.execute("DELETE FROM entries WHERE key = ?1", params![key_str])
            })
            .await?;
        Ok(deleted > 0)
    }

    async fn clear(&self) -> AnycacheResult<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM entries", []).map(|_| ()))
            .await
    }

    async fn stats(&self) -> AnycacheResult<CacheStoreStats> {
        let entries: i64 = self
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0)))
            .await?;
        Ok(CacheStoreStats {
            entries: entries as usize,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> AnycacheResult<bool> {
        let one: i64 = self
            .with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get(0)))
            .await?;
        Ok(one == 1)
    }
}
