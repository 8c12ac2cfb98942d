//! Integration tests for the caching pipeline: key derivation, entry
//! round-trips through real backends, TTL behavior, and degraded-backend
//! pass-through.

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode, Version};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use anycache::cache::entry::CacheEntry;
use anycache::cache::stores::{FileStore, MemoryStore, SqliteStore};
use anycache::{
    AnycacheConfig, AnycacheError, AnycacheResult, BackendHandle, CacheEngine, CacheKey,
    CachePolicy, CacheStore, CacheStoreStats, DefaultKeyDeriver, InterceptedRequest, KeyDeriver,
    Lookup, UpstreamResponse,
};

fn request(method: Method, uri: &str) -> InterceptedRequest {
    InterceptedRequest::new(
        method,
        uri.parse().unwrap(),
        Version::HTTP_11,
        HeaderMap::new(),
        Vec::new(),
        "127.0.0.1:9999".parse().unwrap(),
    )
}

fn html_response(body: &[u8]) -> UpstreamResponse {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", "text/html".parse().unwrap());
    headers.insert("etag", "\"v1\"".parse().unwrap());
    UpstreamResponse::new(StatusCode::OK, headers, Bytes::copy_from_slice(body))
}

fn engine_with(store: Arc<dyn CacheStore>, ttl_secs: u64) -> CacheEngine {
    let config = AnycacheConfig {
        default_ttl_secs: ttl_secs,
        ..Default::default()
    };
    let handle = BackendHandle::resolve(&config).unwrap();
    CacheEngine::new(store, CachePolicy::default(), &handle)
}

#[test]
fn test_key_derivation_is_stable_across_instances() {
    // Separate deriver instances must agree, or keys would not survive
    // a process restart
    let a = DefaultKeyDeriver::new(&[]);
    let b = DefaultKeyDeriver::new(&[]);
    let req = request(Method::GET, "https://example.org/assets/app.css?v=3");

    assert_eq!(a.derive(&req).unwrap(), b.derive(&req).unwrap());
}

#[tokio::test]
async fn test_replay_is_byte_identical_through_file_backend() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn CacheStore> = Arc::new(FileStore::new(dir.path()).await.unwrap());
    let engine = engine_with(store, 60);

    let req = request(Method::GET, "https://example.org/page");
    let key = match engine.lookup(&req).await {
        Lookup::Miss(key) => key,
        other => panic!("expected miss, got {:?}", other),
    };

    let original = html_response(b"<html>\xe2\x9c\x93 exact bytes</html>");
    engine.store(&key, &original).await;

    match engine.lookup(&req).await {
        Lookup::Hit { entry, .. } => {
            let replayed = entry.to_response().unwrap();
            assert_eq!(replayed.body, original.body);
            assert_eq!(replayed.status, original.status);
            assert_eq!(replayed.header("etag"), Some("\"v1\""));
        }
        other => panic!("expected hit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_double_store_is_idempotent() {
    let store: Arc<dyn CacheStore> = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let engine = engine_with(store.clone(), 60);

    let req = request(Method::GET, "https://example.org/page");
    let key = match engine.lookup(&req).await {
        Lookup::Miss(key) => key,
        other => panic!("expected miss, got {:?}", other),
    };

    engine.store(&key, &html_response(b"same")).await;
    engine.store(&key, &html_response(b"same")).await;

    assert_eq!(store.stats().await.unwrap().entries, 1);
    match engine.lookup(&req).await {
        Lookup::Hit { entry, .. } => assert_eq!(entry.body, b"same"),
        other => panic!("expected hit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expired_entry_is_a_miss() {
    let store = Arc::new(MemoryStore::with_defaults());
    let engine = engine_with(store.clone(), 60);

    let req = request(Method::GET, "https://example.org/stale");
    let key = match engine.lookup(&req).await {
        Lookup::Miss(key) => key,
        other => panic!("expected miss, got {:?}", other),
    };

    // Plant an already-expired entry directly in the backend
    let mut entry = CacheEntry::from_response(&html_response(b"old"), Some(Duration::from_secs(1)));
    entry.stored_at = entry.stored_at.saturating_sub(120);
    store.set(&key, entry).await.unwrap();

    assert!(matches!(engine.lookup(&req).await, Lookup::Miss(_)));
}

#[tokio::test]
async fn test_concurrent_stores_leave_one_complete_entry() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::with_defaults());
    let engine = Arc::new(engine_with(store.clone(), 60));

    let req = request(Method::GET, "https://example.org/race");
    let key = match engine.lookup(&req).await {
        Lookup::Miss(key) => key,
        other => panic!("expected miss, got {:?}", other),
    };

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let body = format!("<p>writer {}</p>", i);
                engine.store(&key, &html_response(body.as_bytes())).await;
            })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    // Last write wins; whichever it was, the entry is complete
    let entry = store.get(&key).await.unwrap().unwrap();
    let body = String::from_utf8(entry.body).unwrap();
    assert!(body.starts_with("<p>writer "));
    assert!(body.ends_with("</p>"));
    assert_eq!(store.stats().await.unwrap().entries, 1);
}

/// Store double that fails every operation, standing in for an
/// unreachable backend
struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &CacheKey) -> AnycacheResult<Option<CacheEntry>> {
        Err(AnycacheError::backend("failing", "connection refused"))
    }

    async fn set(&self, _key: &CacheKey, _entry: CacheEntry) -> AnycacheResult<()> {
        Err(AnycacheError::backend("failing", "connection refused"))
    }

    async fn delete(&self, _key: &CacheKey) -> AnycacheResult<bool> {
        Err(AnycacheError::backend("failing", "connection refused"))
    }

    async fn clear(&self) -> AnycacheResult<()> {
        Err(AnycacheError::backend("failing", "connection refused"))
    }

    async fn stats(&self) -> AnycacheResult<CacheStoreStats> {
        Err(AnycacheError::backend("failing", "connection refused"))
    }

    async fn health_check(&self) -> AnycacheResult<bool> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_unreachable_backend_degrades_to_pass_through() {
    let engine = engine_with(Arc::new(FailingStore), 60);
    let req = request(Method::GET, "https://example.org/page");

    // Lookup degrades to a miss rather than erroring
    let key = match engine.lookup(&req).await {
        Lookup::Miss(key) => key,
        other => panic!("expected degraded miss, got {:?}", other),
    };

    // Store swallows the failure; the request path never sees it
    engine.store(&key, &html_response(b"unstored")).await;

    assert!(matches!(engine.lookup(&req).await, Lookup::Miss(_)));
}
