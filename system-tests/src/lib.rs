// system-tests/src/lib.rs
// ============================================================================
// Module: Rule Engine System Tests Library
// Description: Placeholder crate root; all coverage lives under `tests/`.
// Purpose: Let `system-tests` participate in the workspace as a library-less
//          integration-test crate, mirroring the rest of the workspace's
//          `tests/`-only crates.
// Dependencies: none
// ============================================================================

//! This crate carries no runtime code of its own. See `tests/scenarios.rs`
//! for the cross-crate scenarios it exercises.
