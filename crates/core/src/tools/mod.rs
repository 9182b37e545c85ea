//! # Tools
//!
//! Deterministic helpers used by workers that wrap external data sources.
//!
//! ## Modules
//!
//! - `ttl_cache` - Time-bounded memoization for slow lookups (geocoding, crawls)

pub mod ttl_cache;

pub use ttl_cache::{TtlCache, DEFAULT_TTL, PURGE_INTERVAL};
