//! # Proxy Intercept Hook
//!
//! The two interception points the serving layer calls into: the request
//! phase decides between replaying a cached response and forwarding
//! upstream, and the response phase hands a completed upstream response
//! to the engine for storage. The hook also owns the caching headers:
//! the key-override header is consumed here and never reaches the
//! upstream, and replayed responses are marked with the hit header.

use axum::http::{HeaderName, HeaderValue};
use std::sync::Arc;
use tracing::warn;

use crate::cache::engine::{CacheEngine, Lookup};
use crate::cache::key::CacheKey;
use crate::core::types::{InterceptedRequest, UpstreamResponse};

/// Marker value set on the hit header of replayed responses
const HIT_MARKER: &str = "HIT";

/// Decision produced by the request phase
#[derive(Debug)]
pub enum RequestPhase {
    /// Serve this response directly; the upstream is not contacted
    Respond(UpstreamResponse),

    /// Forward the request upstream; when a key is present the response
    /// phase will offer the result to the cache under it
    Forward(Option<CacheKey>),
}

/// The intercept hook wired into the serving layer
pub struct InterceptHook {
    engine: Arc<CacheEngine>,
}

impl InterceptHook {
    /// Wrap the engine for use by the serving layer
    pub fn new(engine: Arc<CacheEngine>) -> Self {
        Self { engine }
    }

    /// The engine behind the hook, for admin surfaces
    pub fn engine(&self) -> &Arc<CacheEngine> {
        &self.engine
    }

    /// Request phase: consult the cache before any upstream contact
    ///
    /// The key-override header is removed from the request here so it is
    /// never forwarded. A corrupt stored entry is treated as a miss and
    /// evicted rather than served.
    pub async fn on_request(&self, request: &mut InterceptedRequest) -> RequestPhase {
        let lookup = self.engine.lookup(request).await;
        self.strip_key_header(request);

        match lookup {
            Lookup::Hit { key, entry } => match entry.to_response() {
                Ok(mut response) => {
                    self.mark_replay(&mut response, &key);
                    RequestPhase::Respond(response)
                }
                Err(e) => {
                    warn!(
                        key_prefix = key.prefix(),
                        error = %e,
                        "stored entry unreplayable, evicting and forwarding"
                    );
                    if let Err(e) = self.engine.invalidate(&key).await {
                        warn!(key_prefix = key.prefix(), error = %e, "eviction failed");
                    }
                    RequestPhase::Forward(Some(key))
                }
            },
            Lookup::Miss(key) => RequestPhase::Forward(Some(key)),
            Lookup::Bypass => RequestPhase::Forward(None),
        }
    }

    /// Response phase: offer a completed upstream response to the cache
    ///
    /// Called only on the forward path; storage failures never propagate
    /// to the client.
    pub async fn on_response(&self, key: Option<&CacheKey>, response: &UpstreamResponse) {
        if let Some(key) = key {
            self.engine.store(key, response).await;
        }
    }

    fn strip_key_header(&self, request: &mut InterceptedRequest) {
        if let Ok(name) = self.engine.policy().key_header.parse::<HeaderName>() {
            request.headers.remove(&name);
        }
    }

    fn mark_replay(&self, response: &mut UpstreamResponse, key: &CacheKey) {
        let policy = self.engine.policy();
        if let Ok(name) = policy.hit_header.parse::<HeaderName>() {
            response
                .headers
                .insert(name, HeaderValue::from_static(HIT_MARKER));
        }
        if let (Ok(name), Ok(value)) = (
            policy.key_header.parse::<HeaderName>(),
            HeaderValue::from_str(key.as_str()),
        ) {
            response.headers.insert(name, value);
        }
    }
}
