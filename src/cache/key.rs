//! # Cache Key Deriver
//!
//! Deterministic fingerprinting of outbound requests. The same logical
//! request must produce the same key across process restarts, so the
//! derivation hashes only stable request attributes: method, normalized
//! absolute URL, and an explicitly configured vary-header subset. Nothing
//! volatile (timestamps, correlation IDs) ever reaches the hasher unless
//! the operator opts a header in.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::core::error::AnycacheResult;
use crate::core::types::InterceptedRequest;

/// Opaque, deterministic request fingerprint
///
/// Layout: `{host}/{scheme}#{method}/{sha256-hex}`. The readable prefix
/// keeps backend listings and logs navigable; the hash carries the
/// collision resistance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an externally supplied key (header override) verbatim
    pub fn from_raw<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines; never log payload contents
    pub fn prefix(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(40)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strategy for deriving a cache key from an intercepted request
pub trait KeyDeriver: Send + Sync {
    /// Derive the fingerprint; fails only on malformed input, in which
    /// case the caller bypasses caching for that request
    fn derive(&self, request: &InterceptedRequest) -> AnycacheResult<CacheKey>;
}

/// Default deriver: method + normalized URL + configured vary headers
#[derive(Debug, Clone)]
pub struct DefaultKeyDeriver {
    /// Lowercased, sorted header names folded into the hash
    vary_headers: Vec<String>,
}

impl DefaultKeyDeriver {
    /// Create a deriver with the given vary-header subset
    pub fn new(vary_headers: &[String]) -> Self {
        let mut vary_headers: Vec<String> =
            vary_headers.iter().map(|h| h.to_lowercase()).collect();
        vary_headers.sort();
        vary_headers.dedup();
        Self { vary_headers }
    }
}

impl KeyDeriver for DefaultKeyDeriver {
    fn derive(&self, request: &InterceptedRequest) -> AnycacheResult<CacheKey> {
        // target_url normalizes the URL (host casing, default ports), which
        // is what makes the key stable across equivalent spellings
        let url = request.target_url()?;

        let mut hasher = Sha256::new();
        hasher.update(url.as_str().as_bytes());
        for name in &self.vary_headers {
            if let Some(value) = request.header(name) {
                hasher.update(name.as_bytes());
                hasher.update(b"=");
                hasher.update(value.as_bytes());
            }
        }
        let digest = hex::encode(hasher.finalize());

        let host = url.host_str().unwrap_or_default();
        Ok(CacheKey(format!(
            "{}/{}#{}/{}",
            host,
            url.scheme(),
            request.method,
            digest
        )))
    }
}
