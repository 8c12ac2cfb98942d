//! # Response Cache Engine
//!
//! Ties the key deriver, cacheability policy, and storage backend into
//! the lookup/store cycle the proxy hook drives. The engine degrades
//! rather than fails: an unreachable backend turns every lookup into a
//! miss and every store into a logged drop, so traffic keeps flowing
//! uncached.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::entry::CacheEntry;
use crate::cache::key::{CacheKey, DefaultKeyDeriver, KeyDeriver};
use crate::cache::policy::CachePolicy;
use crate::cache::stores::{CacheStore, CacheStoreStats};
use crate::core::config::BackendHandle;
use crate::core::error::AnycacheResult;
use crate::core::types::{InterceptedRequest, UpstreamResponse};

/// Outcome of a cache lookup
#[derive(Debug)]
pub enum Lookup {
    /// A fresh entry exists; serve it without contacting the upstream
    Hit {
        /// Key the entry was found under
        key: CacheKey,
        /// The stored entry, ready for replay
        entry: CacheEntry,
    },

    /// No usable entry; forward upstream and store the response under
    /// this key if the policy allows
    Miss(CacheKey),

    /// Caching does not apply to this request at all
    Bypass,
}

/// The cache engine
pub struct CacheEngine {
    store: Arc<dyn CacheStore>,
    deriver: Arc<dyn KeyDeriver>,
    policy: CachePolicy,
    default_ttl: Option<Duration>,
}

impl CacheEngine {
    /// Build the engine from a constructed store and resolved settings
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy, handle: &BackendHandle) -> Self {
        let deriver = Arc::new(DefaultKeyDeriver::new(&policy.vary_headers));
        Self {
            store,
            deriver,
            policy,
            default_ttl: handle.default_ttl,
        }
    }

    /// The active cacheability policy
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Derive the key for a request, honoring an explicit key header
    ///
    /// Returns `None` when the request cannot be keyed (unsupported
    /// method, or malformed enough that no URL can be derived), which
    /// means caching is bypassed for it.
    pub fn derive_key(&self, request: &InterceptedRequest) -> Option<CacheKey> {
        if !self.policy.is_method_cacheable(&request.method) {
            return None;
        }

        if let Some(raw) = request.header(&self.policy.key_header) {
            let raw = raw.trim();
            if !raw.is_empty() {
                return Some(CacheKey::from_raw(raw));
            }
        }

        match self.deriver.derive(request) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, method = %request.method, "cannot derive cache key, bypassing");
                None
            }
        }
    }

    /// LOOKUP: resolve a request against the cache
    ///
    /// Backend failures are absorbed as misses; an expired entry found
    /// by the lazy check is deleted best-effort and reported as a miss.
    pub async fn lookup(&self, request: &InterceptedRequest) -> Lookup {
        let key = match self.derive_key(request) {
            Some(key) => key,
            None => return Lookup::Bypass,
        };

        match self.store.get(&key).await {
            Ok(Some(entry)) => {
                if entry.is_expired() {
                    if let Err(e) = self.store.delete(&key).await {
                        warn!(
                            backend = self.store.name(),
                            key_prefix = key.prefix(),
                            error = %e,
                            "failed to delete expired entry"
                        );
                    }
                    debug!(key_prefix = key.prefix(), "entry expired, treating as miss");
                    Lookup::Miss(key)
                } else {
                    debug!(key_prefix = key.prefix(), "cache hit");
                    Lookup::Hit { key, entry }
                }
            }
            Ok(None) => {
                debug!(key_prefix = key.prefix(), "cache miss");
                Lookup::Miss(key)
            }
            Err(e) => {
                warn!(
                    backend = self.store.name(),
                    key_prefix = key.prefix(),
                    error = %e,
                    "backend unavailable on lookup, serving uncached"
                );
                Lookup::Miss(key)
            }
        }
    }

    /// STORE: capture a completed upstream response under the key
    ///
    /// Never fails the request path: policy rejections are silent and
    /// backend failures are logged and dropped.
    pub async fn store(&self, key: &CacheKey, response: &UpstreamResponse) {
        if !self.policy.is_response_cacheable(response) {
            debug!(
                key_prefix = key.prefix(),
                status = response.status.as_u16(),
                "response not cacheable, skipping store"
            );
            return;
        }

        let entry = CacheEntry::from_response(response, self.default_ttl);
        if let Err(e) = self.store.set(key, entry).await {
            warn!(
                backend = self.store.name(),
                key_prefix = key.prefix(),
                error = %e,
                "backend unavailable on store, response dropped from cache"
            );
        }
    }

    /// Remove a single entry
    pub async fn invalidate(&self, key: &CacheKey) -> AnycacheResult<bool> {
        self.store.delete(key).await
    }

    /// Remove every entry
    pub async fn clear(&self) -> AnycacheResult<()> {
        self.store.clear().await
    }

    /// Backend statistics
    pub async fn stats(&self) -> AnycacheResult<CacheStoreStats> {
        self.store.stats().await
    }

    /// Backend health probe
    pub async fn health_check(&self) -> AnycacheResult<bool> {
        self.store.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::stores::MemoryStore;
    use crate::core::config::AnycacheConfig;
    use axum::http::{HeaderMap, Method, StatusCode, Version};
    use bytes::Bytes;

    fn handle() -> BackendHandle {
        let config = AnycacheConfig {
            default_ttl_secs: 60,
            ..Default::default()
        };
        BackendHandle::resolve(&config).unwrap()
    }

    fn engine() -> CacheEngine {
        CacheEngine::new(
            Arc::new(MemoryStore::with_defaults()),
            CachePolicy::default(),
            &handle(),
        )
    }

    fn request(method: Method, uri: &str, headers: HeaderMap) -> InterceptedRequest {
        InterceptedRequest::new(
            method,
            uri.parse().unwrap(),
            Version::HTTP_11,
            headers,
            Vec::new(),
            "127.0.0.1:9999".parse().unwrap(),
        )
    }

    fn html_response(body: &[u8]) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/html".parse().unwrap());
        UpstreamResponse::new(StatusCode::OK, headers, Bytes::copy_from_slice(body))
    }

    #[tokio::test]
    async fn test_miss_then_store_then_hit() {
        let engine = engine();
        let req = request(Method::GET, "https://example.org/page", HeaderMap::new());

        let key = match engine.lookup(&req).await {
            Lookup::Miss(key) => key,
            other => panic!("expected miss, got {:?}", other),
        };

        engine.store(&key, &html_response(b"<p>hi</p>")).await;

        match engine.lookup(&req).await {
            Lookup::Hit { entry, .. } => assert_eq!(entry.body, b"<p>hi</p>"),
            other => panic!("expected hit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsafe_method_bypasses() {
        let engine = engine();
        let req = request(Method::POST, "https://example.org/submit", HeaderMap::new());
        assert!(matches!(engine.lookup(&req).await, Lookup::Bypass));
    }

    #[tokio::test]
    async fn test_malformed_request_bypasses() {
        let engine = engine();
        let req = request(Method::GET, "/relative-no-host", HeaderMap::new());
        assert!(matches!(engine.lookup(&req).await, Lookup::Bypass));
    }

    #[tokio::test]
    async fn test_key_header_overrides_derivation() {
        let engine = engine();

        let mut headers = HeaderMap::new();
        headers.insert("x-anycache-key", "my-pinned-key".parse().unwrap());
        let req = request(Method::GET, "https://example.org/a", headers);

        match engine.lookup(&req).await {
            Lookup::Miss(key) => assert_eq!(key.as_str(), "my-pinned-key"),
            other => panic!("expected miss, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_uncacheable_response_not_stored() {
        let engine = engine();
        let req = request(Method::GET, "https://example.org/video", HeaderMap::new());

        let key = match engine.lookup(&req).await {
            Lookup::Miss(key) => key,
            other => panic!("expected miss, got {:?}", other),
        };

        let mut headers = HeaderMap::new();
        headers.insert("content-type", "video/mp4".parse().unwrap());
        let resp = UpstreamResponse::new(StatusCode::OK, headers, Bytes::from_static(b"mpeg"));
        engine.store(&key, &resp).await;

        assert!(matches!(engine.lookup(&req).await, Lookup::Miss(_)));
    }
}
