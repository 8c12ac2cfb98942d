//! # Anycache - Caching HTTP Proxy
//!
//! A forward proxy that transparently caches upstream HTTP responses in a
//! pluggable storage backend. Requests are fingerprinted into deterministic
//! cache keys; fresh entries are replayed byte-for-byte without contacting
//! the upstream, and misses are forwarded, captured, and stored for next
//! time. The backend is selected once at startup by URI scheme: an
//! in-process map (`memory://`), per-entry files (`file://` or a bare
//! path), an embedded SQLite database (`sqlite://`), or a shared Redis
//! (`redis://`).
//!
//! ## Architecture
//!
//! - `core`: configuration resolution, error types, and the request/response
//!   shapes exchanged across the transport boundary
//! - `cache`: key derivation, cacheability policy, the stored entry format,
//!   the storage backends, and the engine that drives lookup/store
//! - `proxy`: the intercept hook and the HTTP serving loop
//!
//! A degraded backend never takes traffic down: lookups against an
//! unreachable backend become misses and stores become logged drops.

/// Configuration, error types, and transport-boundary data structures
pub mod core;

/// Key derivation, policy, entry format, stores, and the cache engine
pub mod cache;

/// The intercept hook and HTTP serving loop
pub mod proxy;

// Re-export the types most integrations need
pub use cache::{
    build_store, CacheEngine, CacheEntry, CacheKey, CachePolicy, CacheStore, CacheStoreStats,
    DefaultKeyDeriver, KeyDeriver, Lookup,
};
pub use crate::core::config::{AnycacheConfig, BackendHandle, BackendUri};
pub use crate::core::error::{AnycacheError, AnycacheResult};
pub use crate::core::types::{InterceptedRequest, UpstreamResponse};
pub use proxy::{InterceptHook, ProxyServer, RequestPhase};
