// rule-logic/src/builder.rs
// ============================================================================
// Module: Requirement Builder
// Description: Validated construction of requirement trees.
// Purpose: Reject malformed trees (bad group minimums, excess depth) at the
//          boundary instead of letting them evaluate silently.
// Dependencies: crate::error, crate::requirement
// ============================================================================

//! ## Overview
//! [`RequirementBuilder`] wraps the constructor helpers on
//! [`Requirement`] with validation suitable for configuration loaded from an
//! external source (a rule-chain node's filter config): group minimums are
//! checked against the provided count, and the assembled tree is checked
//! against a maximum depth before being handed back to the caller.

use crate::error::RequirementError;
use crate::requirement::Requirement;

/// Default maximum requirement-tree depth, matching the rule-chain node
/// traversal depth default.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Validates and constructs requirement trees.
#[derive(Debug, Clone, Copy)]
pub struct RequirementBuilder {
    max_depth: usize,
}

impl Default for RequirementBuilder {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RequirementBuilder {
    /// Creates a builder with a custom maximum depth.
    #[must_use]
    pub const fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
        }
    }

    /// Builds a group requirement, validating `min` against the number of
    /// sub-requirements and the resulting depth against the configured limit.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementError::MinExceedsCount`] when `min` exceeds
    /// `requirements.len()`, or [`RequirementError::TooDeep`] when the
    /// resulting tree exceeds the configured maximum depth.
    pub fn require_group<P>(
        &self,
        min: u8,
        requirements: Vec<Requirement<P>>,
    ) -> Result<Requirement<P>, RequirementError> {
        let available = requirements.len();
        if usize::from(min) > available {
            return Err(RequirementError::MinExceedsCount {
                min: usize::from(min),
                available,
            });
        }
        self.finish(Requirement::require_group(min, requirements))
    }

    /// Builds an AND requirement, validating depth.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementError::TooDeep`] when the resulting tree exceeds
    /// the configured maximum depth.
    pub fn and<P>(&self, requirements: Vec<Requirement<P>>) -> Result<Requirement<P>, RequirementError> {
        self.finish(Requirement::and(requirements))
    }

    /// Builds an OR requirement, validating depth.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementError::TooDeep`] when the resulting tree exceeds
    /// the configured maximum depth.
    pub fn or<P>(&self, requirements: Vec<Requirement<P>>) -> Result<Requirement<P>, RequirementError> {
        self.finish(Requirement::or(requirements))
    }

    fn finish<P>(&self, req: Requirement<P>) -> Result<Requirement<P>, RequirementError> {
        let actual = req.depth();
        if actual > self.max_depth {
            return Err(RequirementError::TooDeep {
                max: self.max_depth,
                actual,
            });
        }
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Predicate;

    #[derive(Debug, Clone, PartialEq)]
    struct Leaf;

    impl Predicate for Leaf {
        type Context<'a> = ();

        fn is_satisfied(&self, _ctx: &Self::Context<'_>) -> bool {
            true
        }
    }

    #[test]
    fn rejects_min_exceeding_count() {
        let builder = RequirementBuilder::default();
        let err = builder
            .require_group::<Leaf>(3, vec![Requirement::predicate(Leaf), Requirement::predicate(Leaf)])
            .unwrap_err();
        assert_eq!(
            err,
            RequirementError::MinExceedsCount {
                min: 3,
                available: 2
            }
        );
    }

    #[test]
    fn rejects_trees_past_max_depth() {
        let builder = RequirementBuilder::with_max_depth(1);
        let nested = Requirement::negate(Requirement::predicate(Leaf));
        let err = builder.and(vec![nested]).unwrap_err();
        assert!(matches!(err, RequirementError::TooDeep { max: 1, .. }));
    }
}
