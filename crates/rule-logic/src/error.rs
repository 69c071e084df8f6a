// rule-logic/src/error.rs
// ============================================================================
// Module: Requirement Error Definitions
// Description: Structural errors for requirement trees.
// Purpose: Distinguish load-time structural faults from evaluation results.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Evaluation itself never fails (unresolved leaves are `false`, not an
//! error); the errors here are raised at *build/load* time, when a
//! requirement tree is rejected before it is ever evaluated.

use thiserror::Error;

/// Errors raised while validating a requirement tree before use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
    /// A group's minimum exceeds the number of sub-requirements provided.
    #[error("requirement group minimum ({min}) exceeds available sub-requirements ({available})")]
    MinExceedsCount {
        /// Minimum number of sub-requirements that must be satisfied.
        min: usize,
        /// Number of sub-requirements available.
        available: usize,
    },

    /// The requirement tree exceeds the configured maximum depth.
    #[error("requirement tree depth {actual} exceeds maximum {max}")]
    TooDeep {
        /// Maximum allowed depth.
        max: usize,
        /// Depth actually observed.
        actual: usize,
    },

    /// The requirement tree structure is otherwise invalid.
    #[error("invalid requirement structure: {0}")]
    InvalidStructure(String),
}

/// Convenient result alias for requirement construction.
pub type RequirementResult<T = ()> = Result<T, RequirementError>;
