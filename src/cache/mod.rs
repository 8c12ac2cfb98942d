//! # Cache Module
//!
//! Everything between the intercepted request and the storage backend:
//! key derivation, cacheability policy, the stored entry format, the
//! pluggable store implementations, and the engine that drives the
//! lookup/store cycle.

pub mod engine;
pub mod entry;
pub mod key;
pub mod policy;
pub mod stores;

pub use engine::{CacheEngine, Lookup};
pub use entry::CacheEntry;
pub use key::{CacheKey, DefaultKeyDeriver, KeyDeriver};
pub use policy::CachePolicy;
pub use stores::{build_store, CacheStore, CacheStoreStats};
