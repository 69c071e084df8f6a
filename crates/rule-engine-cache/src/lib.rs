// rule-engine-cache/src/lib.rs
// ============================================================================
// Module: Rule Engine Cache
// Description: The shared Redis connection manager, C1's index cache, and
//              C8's in-process value cache.
// Purpose: Isolate cache-substrate concerns from the store and index crates.
// Dependencies: redis, tokio, parking_lot, time
// ============================================================================

//! ## Overview
//! Two independent caches share one [`CacheHandle`]: [`IndexCache`] (Redis,
//! targeted invalidation, spec §4.1) and [`ValueCache`] (in-process, short
//! TTL, spec §4.8). Neither owns the handle outright, matching spec §8
//! invariant 7: dropping one consumer must not disconnect the other.

pub mod connection;
pub mod error;
pub mod index_cache;
pub mod value_cache;

pub use connection::CacheHandle;
pub use error::CacheError;
pub use index_cache::DEFAULT_INDEX_TTL_SECS;
pub use index_cache::IndexCache;
pub use value_cache::DEFAULT_MAX_ENTRIES;
pub use value_cache::DEFAULT_VALUE_TTL;
pub use value_cache::ValueCache;
