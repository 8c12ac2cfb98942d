//! # Cacheability Policy
//!
//! Decides which requests and responses are eligible for caching: safe
//! methods only, an allowlist of content types (concrete mimetypes or
//! named groups), a status-code allowlist, and a body size ceiling.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::types::UpstreamResponse;

/// Cacheability policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// HTTP methods eligible for caching
    pub cacheable_methods: Vec<String>,

    /// HTTP status codes eligible for caching
    pub cacheable_status_codes: Vec<u16>,

    /// Maximum response body size to cache, in bytes
    pub max_body_bytes: usize,

    /// Request headers folded into the cache key
    pub vary_headers: Vec<String>,

    /// Content types that may be stored; entries are concrete mimetypes
    /// or group names (`web`, `images`, `media`, `documents`, `archives`,
    /// `assets`, `json`)
    pub mimetypes: Vec<String>,

    /// Request header that supplies an explicit cache key
    pub key_header: String,

    /// Response header marking a cache hit on replay
    pub hit_header: String,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cacheable_methods: vec![
                "GET".to_string(),
                "OPTIONS".to_string(),
                "HEAD".to_string(),
            ],
            cacheable_status_codes: vec![200, 203, 204, 300, 301, 404, 410],
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            vary_headers: Vec::new(),
            mimetypes: vec![
                "web".to_string(),
                "images".to_string(),
                "assets".to_string(),
                "json".to_string(),
            ],
            key_header: "x-anycache-key".to_string(),
            hit_header: "x-anycache".to_string(),
        }
    }
}

impl CachePolicy {
    /// Whether the request method is eligible for caching
    pub fn is_method_cacheable(&self, method: &Method) -> bool {
        self.cacheable_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }

    /// Whether the observed response may be stored
    pub fn is_response_cacheable(&self, response: &UpstreamResponse) -> bool {
        if !self
            .cacheable_status_codes
            .contains(&response.status.as_u16())
        {
            return false;
        }

        if response.body.len() > self.max_body_bytes {
            return false;
        }

        if let Some(cache_control) = response.header("cache-control") {
            let cc = cache_control.to_lowercase();
            if cc.contains("no-store") || cc.contains("no-cache") || cc.contains("private") {
                return false;
            }
        }

        match response.content_type() {
            Some(ct) => self.allowed_mimetypes().contains(ct.as_str()),
            // No content type to judge by; a 204 has no body to re-encode
            None => response.body.is_empty(),
        }
    }

    /// Expand the configured mimetype list, resolving group names
    pub fn allowed_mimetypes(&self) -> HashSet<String> {
        let mut allowed = HashSet::new();
        for entry in &self.mimetypes {
            let entry = entry.to_lowercase();
            match mime_group(&entry) {
                Some(group) => allowed.extend(group.iter().map(|m| m.to_string())),
                None => {
                    allowed.insert(entry);
                }
            }
        }
        allowed
    }
}

const WEB: &[&str] = &["text/html", "text/plain", "text/xml", "application/xml"];

const IMAGES: &[&str] = &[
    "image/jpeg",
    "image/bmp",
    "image/png",
    "image/tiff",
    "image/gif",
    "image/svg+xml",
    "image/x-icon",
    "image/webp",
];

const MEDIA: &[&str] = &[
    "audio/mpeg",
    "video/mp4",
    "video/mp2t",
    "video/quicktime",
    "video/x-msvideo",
    "video/webm",
];

const DOCUMENTS: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.ms-excel",
    "application/vnd.ms-powerpoint",
    "application/rtf",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

const ARCHIVES: &[&str] = &[
    "application/zip",
    "application/x-tar",
    "application/x-gzip",
    "application/x-7z-compressed",
];

const ASSETS: &[&str] = &[
    "text/css",
    "application/javascript",
    "application/json",
    "image/x-icon",
    "application/rss+xml",
    "application/atom+xml",
];

/// Resolve a named mimetype group
fn mime_group(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "web" => Some(WEB),
        "images" => Some(IMAGES),
        "media" => Some(MEDIA),
        "documents" => Some(DOCUMENTS),
        "archives" => Some(ARCHIVES),
        "assets" => Some(ASSETS),
        "json" => Some(&["application/json"]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use bytes::Bytes;

    fn response(status: StatusCode, content_type: &str, body: &[u8]) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        if !content_type.is_empty() {
            headers.insert("content-type", content_type.parse().unwrap());
        }
        UpstreamResponse::new(status, headers, Bytes::copy_from_slice(body))
    }

    #[test]
    fn test_safe_methods_cacheable() {
        let policy = CachePolicy::default();
        assert!(policy.is_method_cacheable(&Method::GET));
        assert!(policy.is_method_cacheable(&Method::HEAD));
        assert!(policy.is_method_cacheable(&Method::OPTIONS));
        assert!(!policy.is_method_cacheable(&Method::POST));
        assert!(!policy.is_method_cacheable(&Method::DELETE));
    }

    #[test]
    fn test_mime_groups_expand() {
        let policy = CachePolicy::default();
        let allowed = policy.allowed_mimetypes();
        assert!(allowed.contains("text/html"));
        assert!(allowed.contains("application/json"));
        assert!(allowed.contains("image/png"));
        assert!(!allowed.contains("video/mp4"));
    }

    #[test]
    fn test_concrete_mimetype_entries() {
        let policy = CachePolicy {
            mimetypes: vec!["application/pdf".to_string()],
            ..Default::default()
        };
        let allowed = policy.allowed_mimetypes();
        assert!(allowed.contains("application/pdf"));
        assert!(!allowed.contains("text/html"));
    }

    #[test]
    fn test_response_cacheability() {
        let policy = CachePolicy::default();
        assert!(policy.is_response_cacheable(&response(StatusCode::OK, "text/html", b"ok")));
        assert!(!policy.is_response_cacheable(&response(StatusCode::OK, "video/mp4", b"ok")));
        assert!(!policy.is_response_cacheable(&response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/html",
            b"boom"
        )));
    }

    #[test]
    fn test_cache_control_respected() {
        let policy = CachePolicy::default();
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/html".parse().unwrap());
        headers.insert("cache-control", "private, max-age=60".parse().unwrap());
        let resp = UpstreamResponse::new(StatusCode::OK, headers, Bytes::from_static(b"x"));
        assert!(!policy.is_response_cacheable(&resp));
    }

    #[test]
    fn test_oversized_body_rejected() {
        let policy = CachePolicy {
            max_body_bytes: 4,
            ..Default::default()
        };
        assert!(!policy.is_response_cacheable(&response(StatusCode::OK, "text/html", b"12345")));
        assert!(policy.is_response_cacheable(&response(StatusCode::OK, "text/html", b"1234")));
    }
}
