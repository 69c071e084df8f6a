// rule-engine-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: Error taxonomy for the development/test relational store.
// Purpose: Distinguish retryable busy/lock errors from structural failures.
// Dependencies: rusqlite, thiserror
// ============================================================================

use thiserror::Error;

/// Errors raised by [`crate::SqliteStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened.
    #[error("failed to open store: {0}")]
    Open(String),
    /// A query or statement failed.
    #[error("store query failed: {0}")]
    Query(String),
    /// A stored row failed to deserialize.
    #[error("stored row corrupt: {0}")]
    Corrupt(String),
    /// A referenced row was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Query(err.to_string())
    }
}

impl StoreError {
    /// Whether this failure is a lock/busy condition the caller may retry
    /// (spec §7: `Transient` errors are retryable by the queue substrate).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Query(msg) if msg.contains("database is locked") || msg.contains("busy"))
    }
}
