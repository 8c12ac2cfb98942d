//! # Error Handling Module
//!
//! Error taxonomy for the caching layer. Errors fall into two classes:
//! fatal configuration errors raised during startup, and recoverable
//! errors raised per request. Recoverable errors never abort the proxied
//! transaction; callers degrade to pass-through and log instead.

use thiserror::Error;

/// Main result type used throughout the crate
pub type AnycacheResult<T> = Result<T, AnycacheError>;

/// Error types for the caching proxy layer
///
/// `Configuration` is the only fatal variant and can only occur during
/// startup resolution. Everything else is recoverable: the cache is
/// strictly additive and a failure in it must never fail the request
/// it was trying to serve.
#[derive(Debug, Error)]
pub enum AnycacheError {
    /// Invalid startup configuration (unrecognized backend scheme, bad TTL, etc.)
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The storage backend could not be reached or failed an operation
    #[error("backend `{backend}` unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// The intercepted request could not be fingerprinted (unparsable URL,
    /// missing host). Caching is skipped for this request only.
    #[error("malformed request: {message}")]
    MalformedRequest { message: String },

    /// Upstream fetch failures during the MISS path
    #[error("upstream error: {message}")]
    Upstream { message: String },

    /// Cache entry (de)serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors (file backend, listener setup)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis client errors
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// SQLite errors
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Unexpected internal failures
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AnycacheError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a backend-unavailable error naming the failing backend
    pub fn backend<S: Into<String>>(backend: &'static str, message: S) -> Self {
        Self::BackendUnavailable {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    /// Create a malformed-request error with a custom message
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Create an upstream error with a custom message
    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error is fatal to the process
    ///
    /// Only configuration errors are fatal, and only at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Whether callers should degrade to pass-through and continue
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

impl From<reqwest::Error> for AnycacheError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AnycacheError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: format!("failed to parse config: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_is_fatal() {
        assert!(AnycacheError::config("unknown scheme `gopher`").is_fatal());
        assert!(!AnycacheError::config("unknown scheme `gopher`").is_recoverable());
    }

    #[test]
    fn test_runtime_errors_are_recoverable() {
        assert!(AnycacheError::backend("redis", "connection refused").is_recoverable());
        assert!(AnycacheError::malformed("relative URI without host").is_recoverable());
        assert!(AnycacheError::upstream("timeout").is_recoverable());
    }

    #[test]
    fn test_backend_error_names_backend() {
        let err = AnycacheError::backend("file", "disk full");
        assert!(err.to_string().contains("file"));
        assert!(err.to_string().contains("disk full"));
    }
}
