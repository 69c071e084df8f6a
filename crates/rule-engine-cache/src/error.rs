// rule-engine-cache/src/error.rs
// ============================================================================
// Module: Cache Errors
// Description: Error taxonomy for the shared Redis-backed cache layer.
// Purpose: Callers (C1, C8) treat every variant as `Transient` (spec §7);
//          this type exists only for logging/metrics at the cache boundary.
// Dependencies: redis, thiserror
// ============================================================================

use thiserror::Error;

/// Errors raised by [`crate::CacheHandle`] and its consumers.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The Redis connection manager could not be established.
    #[error("cache connection error: {0}")]
    Connection(String),
    /// A Redis command failed after the connection was established.
    #[error("cache command error: {0}")]
    Command(String),
    /// A cached value could not be decoded.
    #[error("cache value corrupt: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Command(err.to_string())
    }
}
