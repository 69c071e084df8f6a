// rule-engine-worker/src/error.rs
// ============================================================================
// Module: Worker Errors
// Description: Structural failures that should retry the job that produced
//              them (spec §7's `EngineError::Transient`/`Fatal` split).
// Purpose: Distinguish a malformed job from a per-chain execution fault,
//          which is isolated and never surfaces here (spec §7).
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors that abort processing of one job entirely (never a per-chain
/// fault, which is isolated per spec §7).
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The job's payload did not deserialize into an [`rule_engine_core::Event`].
    #[error("malformed job payload: {0}")]
    MalformedPayload(String),
}
