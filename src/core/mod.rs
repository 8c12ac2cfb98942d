//! Core functionality: error taxonomy, configuration resolution, and the
//! request/response types exchanged with the interception runtime.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AnycacheConfig, BackendHandle, BackendUri};
pub use error::{AnycacheError, AnycacheResult};
pub use types::{InterceptedRequest, UpstreamResponse};
