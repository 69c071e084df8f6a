// rule-engine-store-postgres/src/error.rs
// ============================================================================
// Module: Postgres Store Errors
// Description: Error taxonomy for the production relational store backend.
// Purpose: Distinguish retryable connection/pool errors from structural
//          failures (spec §7 `Transient` vs. structural).
// Dependencies: sqlx, thiserror
// ============================================================================

use thiserror::Error;

/// Errors raised by [`crate::PostgresStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection pool could not be established.
    #[error("failed to connect to store: {0}")]
    Connect(String),
    /// A query or statement failed.
    #[error("store query failed: {0}")]
    Query(String),
    /// A stored row failed to deserialize.
    #[error("stored row corrupt: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Query(err.to_string())
    }
}

impl StoreError {
    /// Whether this failure is a connection/pool condition the caller may
    /// retry (spec §7: `Transient` errors are retryable by the queue
    /// substrate).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Query(msg) if msg.contains("pool timed out") || msg.contains("connection") || msg.contains("closed"))
    }
}
