//! # Cache Entry
//!
//! The stored unit: a complete captured response plus TTL bookkeeping.
//! Entries are owned by the storage backend and replaced wholesale, never
//! mutated in place. Headers are kept as an ordered list so replay
//! preserves the order the upstream sent them in, and the body is raw
//! bytes so replay is byte-for-byte.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::core::error::{AnycacheError, AnycacheResult};
use crate::core::types::UpstreamResponse;

/// A cached response entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Response status code
    pub status: u16,

    /// Response headers in original order; names compared case-insensitively,
    /// values kept as raw bytes so non-UTF-8 values survive the round trip
    pub headers: Vec<(String, Vec<u8>)>,

    /// Response body, exactly as received
    pub body: Vec<u8>,

    /// Unix timestamp (seconds) when the entry was stored
    pub stored_at: u64,

    /// TTL in seconds; `None` means the entry never expires
    pub ttl_secs: Option<u64>,
}

impl CacheEntry {
    /// Capture a completed upstream response into an entry
    pub fn from_response(response: &UpstreamResponse, ttl: Option<Duration>) -> Self {
        // iter() repeats the name for multi-valued headers, so appended
        // values land in the list in their original slot order
        let mut headers = Vec::with_capacity(response.headers.len());
        for (name, value) in response.headers.iter() {
            headers.push((name.as_str().to_string(), value.as_bytes().to_vec()));
        }

        Self {
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            stored_at: unix_now(),
            ttl_secs: ttl.map(|t| t.as_secs()),
        }
    }

    /// Unix timestamp after which the entry is expired, if it expires
    pub fn expires_at(&self) -> Option<u64> {
        self.ttl_secs.map(|ttl| self.stored_at.saturating_add(ttl))
    }

    /// Lazy expiry check: `stored_at + ttl <= now` means absent
    pub fn is_expired(&self) -> bool {
        match self.expires_at() {
            Some(expires_at) => unix_now() >= expires_at,
            None => false,
        }
    }

    /// Remaining lifetime, for backends with native expiry support
    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at()
            .map(|expires_at| Duration::from_secs(expires_at.saturating_sub(unix_now())))
    }

    /// Serialize for storage as raw bytes
    pub fn to_bytes(&self) -> AnycacheResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from stored bytes
    pub fn from_bytes(bytes: &[u8]) -> AnycacheResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Rebuild the response for replay; header order is preserved via
    /// append and the body bytes are handed back untouched
    pub fn to_response(&self) -> AnycacheResult<UpstreamResponse> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| AnycacheError::internal(format!("invalid cached status: {}", e)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                HeaderValue::from_bytes(value),
            ) {
                headers.append(name, value);
            }
        }

        Ok(UpstreamResponse::new(
            status,
            headers,
            Bytes::from(self.body.clone()),
        ))
    }
}

/// Seconds since the Unix epoch
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn sample_response() -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/html".parse().unwrap());
        headers.insert("etag", "\"abc\"".parse().unwrap());
        headers.append("set-cookie", "a=1".parse().unwrap());
        headers.append("set-cookie", "b=2".parse().unwrap());
        UpstreamResponse::new(
            StatusCode::OK,
            headers,
            Bytes::from_static(b"<html>hello</html>"),
        )
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let entry = CacheEntry::from_response(&sample_response(), Some(Duration::from_secs(60)));
        let restored = CacheEntry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        assert_eq!(entry, restored);
        assert_eq!(restored.body, b"<html>hello</html>");
    }

    #[test]
    fn test_replay_preserves_headers_and_body() {
        let entry = CacheEntry::from_response(&sample_response(), None);
        let replayed = entry.to_response().unwrap();

        assert_eq!(replayed.status, StatusCode::OK);
        assert_eq!(replayed.body.as_ref(), b"<html>hello</html>");
        assert_eq!(replayed.header("content-type"), Some("text/html"));

        let cookies: Vec<_> = replayed.headers.get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0], "a=1");
        assert_eq!(cookies[1], "b=2");
    }

    #[test]
    fn test_non_utf8_header_value_survives_replay() {
        // Latin-1 filename in content-disposition: a valid header value,
        // but not valid UTF-8
        let raw = b"attachment; filename=\"r\xe9sum\xe9.pdf\"";
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/pdf".parse().unwrap());
        headers.insert(
            "content-disposition",
            HeaderValue::from_bytes(raw).unwrap(),
        );
        let response =
            UpstreamResponse::new(StatusCode::OK, headers, Bytes::from_static(b"%PDF-1.4"));

        let entry = CacheEntry::from_response(&response, None);
        let restored = CacheEntry::from_bytes(&entry.to_bytes().unwrap()).unwrap();
        let replayed = restored.to_response().unwrap();

        let value = replayed.headers.get("content-disposition").unwrap();
        assert_eq!(value.as_bytes(), raw.as_ref());
    }

    #[test]
    fn test_expiry() {
        let mut entry = CacheEntry::from_response(&sample_response(), Some(Duration::from_secs(60)));
        assert!(!entry.is_expired());

        // Backdate past the TTL
        entry.stored_at = unix_now() - 120;
        assert!(entry.is_expired());
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let mut entry = CacheEntry::from_response(&sample_response(), None);
        entry.stored_at = 0;
        assert!(!entry.is_expired());
        assert_eq!(entry.remaining_ttl(), None);
    }
}
