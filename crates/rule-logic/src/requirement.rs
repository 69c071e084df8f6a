// rule-logic/src/requirement.rs
// ============================================================================
// Module: Requirement Tree
// Description: Generic AND/OR/NOT/RequireGroup boolean expression tree.
// Purpose: Evaluate filter-node expressions over a domain-supplied context.
// Dependencies: smallvec, serde
// ============================================================================

//! ## Overview
//! `Requirement<P>` is a generic boolean-algebra tree. Leaves are a
//! domain-supplied predicate type `P`; internal nodes compose leaves with
//! AND, OR, NOT, and a minimum-count group. Evaluation is plain boolean and
//! short-circuits the same way the underlying operators would.

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;
use smallvec::SmallVec;

use crate::traits::Predicate;

// ============================================================================
// SECTION: Requirement Identifier
// ============================================================================

/// Error returned when constructing a [`RequirementId`] from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequirementIdError;

impl fmt::Display for RequirementIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requirement id must be non-zero")
    }
}

impl std::error::Error for RequirementIdError {}

/// Stable identifier for a requirement node, used for tracing and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequirementId(NonZeroU64);

impl RequirementId {
    /// Creates a requirement id from a raw value.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementIdError`] when `value` is zero.
    pub fn new(value: u64) -> Result<Self, RequirementIdError> {
        NonZeroU64::new(value).map(Self).ok_or(RequirementIdError)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

// ============================================================================
// SECTION: Requirement Tree
// ============================================================================

/// A generic boolean expression tree over a domain predicate `P`.
///
/// Internal nodes combine sub-requirements with the usual short-circuit
/// semantics; [`Self::RequireGroup`] generalizes AND/OR into "at least `min`
/// of these `reqs` hold".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Requirement<P> {
    /// Logical AND of sub-requirements. An empty AND is trivially satisfied.
    And(SmallVec<[Box<Self>; 4]>),
    /// Logical OR of sub-requirements. An empty OR is trivially unsatisfiable.
    Or(SmallVec<[Box<Self>; 4]>),
    /// Logical negation of a sub-requirement.
    Not(Box<Self>),
    /// At least `min` of `reqs` must hold.
    RequireGroup {
        /// Minimum number of sub-requirements that must be satisfied.
        min: u8,
        /// The sub-requirements in this group.
        reqs: SmallVec<[Box<Self>; 8]>,
    },
    /// A leaf predicate evaluated against the domain context.
    Predicate(P),
}

impl<P> Requirement<P>
where
    P: Predicate,
{
    /// Evaluates this requirement against `ctx`, short-circuiting where possible.
    ///
    /// Unresolved leaves (a predicate whose referenced value is absent from
    /// the context) evaluate to `false` via [`Predicate::is_satisfied`]; this
    /// method never distinguishes "unknown" from "false".
    pub fn eval(&self, ctx: &P::Context<'_>) -> bool {
        match self {
            Self::Predicate(predicate) => predicate.is_satisfied(ctx),
            Self::Not(requirement) => !requirement.eval(ctx),
            Self::And(requirements) => requirements.iter().all(|req| req.eval(ctx)),
            Self::Or(requirements) => requirements.iter().any(|req| req.eval(ctx)),
            Self::RequireGroup {
                min,
                reqs,
            } => {
                let min_required = usize::from(*min);
                if min_required == 0 {
                    return true;
                }
                if min_required > reqs.len() {
                    return false;
                }

                let mut satisfied = 0usize;
                let mut remaining = reqs.len();
                for req in reqs {
                    if req.eval(ctx) {
                        satisfied += 1;
                        if satisfied >= min_required {
                            return true;
                        }
                    }
                    remaining = remaining.saturating_sub(1);
                    if satisfied + remaining < min_required {
                        return false;
                    }
                }
                satisfied >= min_required
            }
        }
    }
}

impl<P> Requirement<P> {
    /// Determines if this requirement is trivially satisfied, without consulting `P`.
    #[must_use]
    pub fn is_trivially_satisfied(&self) -> bool {
        match self {
            Self::And(reqs) if reqs.is_empty() => true,
            Self::And(reqs) => reqs.iter().all(|r| r.is_trivially_satisfied()),
            Self::Or(reqs) => reqs.iter().any(|r| r.is_trivially_satisfied()),
            Self::Not(req) => req.is_trivially_unsatisfiable(),
            Self::RequireGroup {
                min, ..
            } if *min == 0 => true,
            Self::RequireGroup {
                min,
                reqs,
            } => {
                let count = reqs.iter().filter(|r| r.is_trivially_satisfied()).count();
                count >= usize::from(*min)
            }
            Self::Predicate(_) => false,
        }
    }

    /// Determines if this requirement is trivially unsatisfiable, without consulting `P`.
    #[must_use]
    pub fn is_trivially_unsatisfiable(&self) -> bool {
        match self {
            Self::Or(reqs) if reqs.is_empty() => true,
            Self::And(reqs) => reqs.iter().any(|r| r.is_trivially_unsatisfiable()),
            Self::Or(reqs) => reqs.iter().all(|r| r.is_trivially_unsatisfiable()),
            Self::Not(req) => req.is_trivially_satisfied(),
            Self::RequireGroup {
                min,
                reqs,
            } if usize::from(*min) > reqs.len() => true,
            Self::RequireGroup {
                min,
                reqs,
            } => {
                let unsatisfiable = reqs.iter().filter(|r| r.is_trivially_unsatisfiable()).count();
                reqs.len() - unsatisfiable < usize::from(*min)
            }
            Self::Predicate(_) => false,
        }
    }

    /// Returns the number of nodes in this requirement tree.
    #[must_use]
    pub fn complexity(&self) -> usize {
        match self {
            Self::Predicate(_) => 1,
            Self::Not(req) => 1 + req.complexity(),
            Self::And(reqs) | Self::Or(reqs) => {
                1 + reqs.iter().map(|r| r.complexity()).sum::<usize>()
            }
            Self::RequireGroup {
                reqs, ..
            } => 1 + reqs.iter().map(|r| r.complexity()).sum::<usize>(),
        }
    }

    /// Returns the maximum depth of this requirement tree (a leaf has depth 1).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Predicate(_) => 1,
            Self::Not(req) => 1 + req.depth(),
            Self::And(reqs) | Self::Or(reqs) => {
                1 + reqs.iter().map(|r| r.depth()).max().unwrap_or(0)
            }
            Self::RequireGroup {
                reqs, ..
            } => 1 + reqs.iter().map(|r| r.depth()).max().unwrap_or(0),
        }
    }
}

// ============================================================================
// SECTION: Constructor Helpers
// ============================================================================

impl<P> Requirement<P> {
    /// Creates a logical AND of the given requirements.
    pub fn and(requirements: Vec<Self>) -> Self {
        Self::And(requirements.into_iter().map(Box::new).collect())
    }

    /// Creates a logical OR of the given requirements.
    pub fn or(requirements: Vec<Self>) -> Self {
        Self::Or(requirements.into_iter().map(Box::new).collect())
    }

    /// Creates a logical NOT of the given requirement.
    pub fn negate(requirement: Self) -> Self {
        Self::Not(Box::new(requirement))
    }

    /// Creates a group requirement with a minimum satisfaction count.
    pub fn require_group(min: u8, requirements: Vec<Self>) -> Self {
        Self::RequireGroup {
            min,
            reqs: requirements.into_iter().map(Box::new).collect(),
        }
    }

    /// Creates a requirement from a single predicate leaf.
    pub const fn predicate(predicate: P) -> Self {
        Self::Predicate(predicate)
    }
}

impl<P> std::ops::Not for Requirement<P> {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

impl<P> Default for Requirement<P> {
    /// Creates an empty AND requirement (trivially satisfied).
    fn default() -> Self {
        Self::And(SmallVec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Always(bool);

    impl Predicate for Always {
        type Context<'a> = ();

        fn is_satisfied(&self, _ctx: &Self::Context<'_>) -> bool {
            self.0
        }
    }

    #[test]
    fn empty_and_is_trivially_satisfied() {
        let req: Requirement<Always> = Requirement::and(vec![]);
        assert!(req.is_trivially_satisfied());
        assert!(req.eval(&()));
    }

    #[test]
    fn empty_or_is_trivially_unsatisfiable() {
        let req: Requirement<Always> = Requirement::or(vec![]);
        assert!(req.is_trivially_unsatisfiable());
        assert!(!req.eval(&()));
    }

    #[test]
    fn require_group_short_circuits_on_success() {
        let req = Requirement::require_group(
            2,
            vec![
                Requirement::predicate(Always(true)),
                Requirement::predicate(Always(true)),
                Requirement::predicate(Always(false)),
            ],
        );
        assert!(req.eval(&()));
    }

    #[test]
    fn require_group_fails_when_unreachable() {
        let req = Requirement::require_group(
            3,
            vec![
                Requirement::predicate(Always(true)),
                Requirement::predicate(Always(false)),
                Requirement::predicate(Always(false)),
            ],
        );
        assert!(!req.eval(&()));
    }

    #[test]
    fn not_negates_inner_result() {
        let req = Requirement::negate(Requirement::predicate(Always(true)));
        assert!(!req.eval(&()));
    }

    #[test]
    fn depth_and_complexity_count_nodes() {
        let req = Requirement::and(vec![
            Requirement::predicate(Always(true)),
            Requirement::negate(Requirement::predicate(Always(false))),
        ]);
        assert_eq!(req.complexity(), 4);
        assert_eq!(req.depth(), 3);
    }
}
