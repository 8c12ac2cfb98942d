//! # Configuration Module
//!
//! Startup configuration resolution. Settings come from an optional YAML
//! file plus `ANYCACHE_*` environment overrides, and resolve once into an
//! immutable [`BackendHandle`] that is passed explicitly to every component
//! that needs it. Resolution fails fast: an unrecognized backend scheme or
//! an unparsable TTL aborts startup with a clear error.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::policy::CachePolicy;
use crate::core::error::{AnycacheError, AnycacheResult};

/// Complete configuration for the caching proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnycacheConfig {
    /// Address the interception runtime listens on
    pub listen_addr: String,

    /// Backend selection URI; the scheme picks the storage variant
    /// (`memory://`, `redis://host`, `sqlite://path`, `file://path`,
    /// `s3://bucket/prefix`, or a bare local path)
    pub backend_uri: String,

    /// Default TTL in seconds for stored entries; 0 means no expiry
    pub default_ttl_secs: u64,

    /// Timeout for upstream fetches on the MISS path
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,

    /// Key prefix applied by the Redis backend
    pub redis_key_prefix: String,

    /// Cacheability policy (methods, status codes, mimetypes, vary headers)
    pub policy: CachePolicy,
}

impl Default for AnycacheConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3128".to_string(),
            backend_uri: "memory://".to_string(),
            default_ttl_secs: 0,
            upstream_timeout: Duration::from_secs(30),
            redis_key_prefix: "anycache:".to_string(),
            policy: CachePolicy::default(),
        }
    }
}

impl AnycacheConfig {
    /// Load configuration from defaults, an optional YAML file
    /// (`ANYCACHE_CONFIG_PATH`), and environment overrides
    pub async fn load() -> AnycacheResult<Self> {
        let mut config = match std::env::var("ANYCACHE_CONFIG_PATH") {
            Ok(path) => Self::load_from_file(&path).await?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> AnycacheResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            AnycacheError::config(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: AnycacheConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Variables follow the pattern `ANYCACHE_<FIELD>`, for example
    /// `ANYCACHE_BACKEND_URI=redis://localhost:6379`.
    pub fn apply_env_overrides(&mut self) -> AnycacheResult<()> {
        use std::env;

        if let Ok(addr) = env::var("ANYCACHE_LISTEN_ADDR") {
            self.listen_addr = addr;
        }

        if let Ok(uri) = env::var("ANYCACHE_BACKEND_URI") {
            self.backend_uri = uri;
        }

        if let Ok(ttl) = env::var("ANYCACHE_DEFAULT_TTL") {
            self.default_ttl_secs = ttl.parse().map_err(|e| {
                AnycacheError::config(format!("invalid ANYCACHE_DEFAULT_TTL `{}`: {}", ttl, e))
            })?;
        }

        if let Ok(timeout) = env::var("ANYCACHE_UPSTREAM_TIMEOUT") {
            self.upstream_timeout = humantime::parse_duration(&timeout).map_err(|e| {
                AnycacheError::config(format!(
                    "invalid ANYCACHE_UPSTREAM_TIMEOUT `{}`: {}",
                    timeout, e
                ))
            })?;
        }

        if let Ok(prefix) = env::var("ANYCACHE_REDIS_KEY_PREFIX") {
            self.redis_key_prefix = prefix;
        }

        if let Ok(mimetypes) = env::var("ANYCACHE_CACHE_MIMETYPES") {
            self.policy.mimetypes = mimetypes
                .split(',')
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect();
        }

        if let Ok(name) = env::var("ANYCACHE_KEY_HEADER") {
            self.policy.key_header = name.to_lowercase();
        }

        if let Ok(name) = env::var("ANYCACHE_HIT_HEADER") {
            self.policy.hit_header = name.to_lowercase();
        }

        Ok(())
    }

    /// Validate the configuration, collecting every problem found
    pub fn validate(&self) -> AnycacheResult<()> {
        let mut errors = Vec::new();

        if self.listen_addr.parse::<SocketAddr>().is_err() {
            errors.push(format!("invalid listen_addr `{}`", self.listen_addr));
        }

        if let Err(e) = BackendUri::parse(&self.backend_uri) {
            errors.push(e.to_string());
        }

        if self.upstream_timeout.as_millis() == 0 {
            errors.push("upstream_timeout must be greater than 0".to_string());
        }

        if self.policy.cacheable_methods.is_empty() {
            errors.push("policy.cacheable_methods cannot be empty".to_string());
        }

        if self.policy.max_body_bytes == 0 {
            errors.push("policy.max_body_bytes must be greater than 0".to_string());
        }

        if self.policy.key_header.is_empty() || self.policy.hit_header.is_empty() {
            errors.push("policy header names cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AnycacheError::config(errors.join("; ")))
        }
    }

    /// Parsed listen address; call after `validate`
    pub fn listen_addr(&self) -> AnycacheResult<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| AnycacheError::config(format!("invalid listen_addr: {}", e)))
    }
}

/// Storage backend variant selected by the configuration URI scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendUri {
    /// In-process map, lost on restart
    Memory,
    /// One file per entry under a local directory
    File(PathBuf),
    /// Embedded SQLite database file
    Sqlite(PathBuf),
    /// Remote Redis cache; the full connection URL is kept verbatim
    Redis(String),
    /// Remote object store; bucket plus an optional key prefix
    S3 { bucket: String, prefix: String },
}

impl BackendUri {
    /// Parse a backend selection string
    ///
    /// A bare local path (no scheme) selects the file backend. Unknown
    /// schemes are a fatal configuration error.
    pub fn parse(raw: &str) -> AnycacheResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AnycacheError::config("backend URI cannot be empty"));
        }

        if !raw.contains("://") {
            return Ok(Self::File(PathBuf::from(raw)));
        }

        let url = Url::parse(raw)
            .map_err(|e| AnycacheError::config(format!("invalid backend URI `{}`: {}", raw, e)))?;

        match url.scheme() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File(uri_path(&url, raw)?)),
            "sqlite" => Ok(Self::Sqlite(uri_path(&url, raw)?)),
            "redis" | "rediss" => Ok(Self::Redis(raw.to_string())),
            "s3" => {
                let bucket = url.host_str().map(str::to_string).ok_or_else(|| {
                    AnycacheError::config(format!("backend URI `{}` has no bucket", raw))
                })?;
                let prefix = url.path().trim_matches('/').to_string();
                Ok(Self::S3 { bucket, prefix })
            }
            scheme => Err(AnycacheError::config(format!(
                "unrecognized backend scheme `{}` in `{}`",
                scheme, raw
            ))),
        }
    }

    /// Backend name used in logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
            Self::Sqlite(_) => "sqlite",
            Self::Redis(_) => "redis",
            Self::S3 { .. } => "s3",
        }
    }
}

/// Extract a filesystem path from `file://` / `sqlite://` URIs
///
/// `sqlite://cache.db` puts the path in the host position; `sqlite:///var/x.db`
/// puts it in the path. Both spellings are accepted.
fn uri_path(url: &Url, raw: &str) -> AnycacheResult<PathBuf> {
    let mut path = String::new();
    if let Some(host) = url.host_str() {
        path.push_str(host);
    }
    path.push_str(url.path());
    if path.is_empty() {
        return Err(AnycacheError::config(format!(
            "backend URI `{}` has no path",
            raw
        )));
    }
    Ok(PathBuf::from(path))
}

/// Process-wide backend configuration, resolved once at startup
///
/// Immutable for the process lifetime; constructed by the configuration
/// resolver and passed explicitly to the store builder and cache engine.
#[derive(Debug, Clone)]
pub struct BackendHandle {
    /// Selected backend variant
    pub uri: BackendUri,

    /// Default TTL for stored entries; `None` means entries never expire
    pub default_ttl: Option<Duration>,

    /// Key prefix for the Redis backend
    pub redis_key_prefix: String,
}

impl BackendHandle {
    /// Resolve the backend handle from validated configuration
    pub fn resolve(config: &AnycacheConfig) -> AnycacheResult<Self> {
        let uri = BackendUri::parse(&config.backend_uri)?;
        let default_ttl = match config.default_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Ok(Self {
            uri,
            default_ttl,
            redis_key_prefix: config.redis_key_prefix.clone(),
        })
    }
}
