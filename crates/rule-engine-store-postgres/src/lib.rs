// rule-engine-store-postgres/src/lib.rs
// ============================================================================
// Module: Postgres Relational Store (production backend)
// Description: Crate root; re-exports the public store and error types.
// Purpose: The backend `rule-engine-cli` wires up in production, mirroring
//          `rule-engine-store-sqlite`'s public surface on an async pool.
// Dependencies: sqlx, rule-engine-core
// ============================================================================

//! ## Overview
//! Same five tables and canonical-JSON-row shape as
//! `rule-engine-store-sqlite`, built on `sqlx`'s async `PgPool` rather than
//! a `Mutex<rusqlite::Connection>`. See [`store`]'s module documentation
//! for the deliberate divergence from the teacher's shared synchronous
//! store trait.

mod error;
mod store;

pub use crate::error::StoreError;
pub use crate::store::PostgresStore;
