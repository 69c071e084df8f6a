// rule-engine-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Store
// Description: Development/test relational store backend (spec §6).
// Purpose: Let the engine run without a Postgres instance.
// Dependencies: rusqlite, rule-engine-core, serde_json
// ============================================================================

//! ## Overview
//! Mirrors `decision-gate-store-sqlite`'s role in its workspace: the
//! durable backend used for local development and the crate's own test
//! suite, with `rule-engine-store-postgres` serving production.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::SqliteStore;
