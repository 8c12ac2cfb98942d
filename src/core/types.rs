//! # Core Types Module
//!
//! Data structures exchanged across the proxy transport boundary: the
//! intercepted request handed to the request-phase hook, and the response
//! observed in (or synthesized for) the response phase.

use axum::http::{HeaderMap, Method, StatusCode, Uri, Version};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::core::error::{AnycacheError, AnycacheResult};

/// An intercepted request before it is forwarded upstream
///
/// This is the unified request shape the caching layer works with,
/// independent of the transport runtime that produced it. The body is
/// behind an `Arc` so cloning the request never copies large payloads.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    /// Unique identifier for this request (tracing and logging)
    pub id: String,

    /// HTTP method
    pub method: Method,

    /// Request URI; absolute-form when the client speaks proxy protocol,
    /// origin-form otherwise (target host then comes from the Host header)
    pub uri: Uri,

    /// HTTP version
    pub version: Version,

    /// Request headers
    pub headers: HeaderMap,

    /// Request body bytes
    pub body: Arc<Vec<u8>>,

    /// Client's remote address
    pub remote_addr: SocketAddr,

    /// Timestamp when the request was intercepted
    pub received_at: Instant,
}

impl InterceptedRequest {
    /// Create a new intercepted request with a generated ID
    pub fn new(
        method: Method,
        uri: Uri,
        version: Version,
        headers: HeaderMap,
        body: Vec<u8>,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            uri,
            version,
            headers,
            body: Arc::new(body),
            remote_addr,
            received_at: Instant::now(),
        }
    }

    /// Get the request path without query parameters
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Get query parameters as a string
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Get a header value by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Target scheme, defaulting to `http` for origin-form requests
    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("http")
    }

    /// Target host, from the URI authority or the Host header
    pub fn host(&self) -> Option<&str> {
        if let Some(host) = self.uri.host() {
            return Some(host);
        }
        self.header("host")
    }

    /// Resolve the absolute upstream URL for this request
    ///
    /// Origin-form requests are completed with the Host header. A request
    /// with no resolvable host cannot be fingerprinted or forwarded.
    pub fn target_url(&self) -> AnycacheResult<Url> {
        let raw = if self.uri.scheme().is_some() && self.uri.host().is_some() {
            self.uri.to_string()
        } else {
            let host = self
                .host()
                .ok_or_else(|| AnycacheError::malformed("request has no resolvable host"))?;
            let path_and_query = self
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            format!("{}://{}{}", self.scheme(), host, path_and_query)
        };

        Url::parse(&raw).map_err(|e| AnycacheError::malformed(format!("unparsable URL `{}`: {}", raw, e)))
    }
}

/// A complete upstream response as observed at the response phase,
/// or synthesized from a cache entry at the request phase
///
/// Replay is byte-for-byte: the body is carried as raw bytes and never
/// re-encoded by the caching layer.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Response status code
    pub status: StatusCode,

    /// Response headers
    pub headers: HeaderMap,

    /// Response body bytes, exactly as received
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Create a new upstream response
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Get a header value by name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Normalized content type: lowercased, parameters stripped
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_lowercase())
            .filter(|ct| !ct.is_empty())
    }
}
