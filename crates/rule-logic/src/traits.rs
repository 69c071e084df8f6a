// rule-logic/src/traits.rs
// ============================================================================
// Module: Predicate Trait
// Description: Domain hook for requirement-tree leaf evaluation.
// Purpose: Decouple the requirement tree from any specific context shape.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A single trait, [`Predicate`], is the seam between the generic
//! [`crate::Requirement`] tree and a domain's notion of "context" (for this
//! workspace, a rule-chain execution snapshot). Implementors decide what
//! counts as an unresolved reference; by convention an unresolved reference
//! is simply not satisfied, never a distinct error.

/// A leaf condition evaluated against a borrowed domain context.
pub trait Predicate {
    /// The borrowed context type leaves are evaluated against.
    type Context<'a>;

    /// Returns whether this predicate holds against `ctx`.
    fn is_satisfied(&self, ctx: &Self::Context<'_>) -> bool;
}
