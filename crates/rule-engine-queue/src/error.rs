// rule-engine-queue/src/error.rs
// ============================================================================
// Module: Queue Errors
// Description: Failure modes for the durable priority queue (C4).
// Purpose: Distinguish transport failures from corrupt job bodies.
// Dependencies: thiserror, redis
// ============================================================================

use thiserror::Error;

/// Errors the durable queue can surface.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The Redis command itself failed (connection, script, argument).
    #[error("queue backend error: {0}")]
    Backend(String),
    /// A job body stored in the queue failed to deserialize.
    #[error("corrupt job body for {job_id}: {source}")]
    Corrupt {
        /// The job identifier whose body failed to parse.
        job_id: String,
        /// The underlying deserialization error.
        source: serde_json::Error,
    },
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}
