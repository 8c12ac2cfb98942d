//! # Proxy Module
//!
//! The interception side of the caching layer: the hook that the serving
//! loop calls at the request and response phases, and the HTTP server
//! that drives it.

pub mod hook;
pub mod server;

pub use hook::{InterceptHook, RequestPhase};
pub use server::{forward_upstream, ProxyServer};
