// rule-engine-metrics/src/lib.rs
// ============================================================================
// Module: Metrics & Health (C11)
// Description: Counters, histograms, and gauges named by spec §4.11, with a
//              cardinality guard no call site can bypass.
// Purpose: The one place every other crate reports through; none of them
//          touch `prometheus` directly.
// Dependencies: prometheus, parking_lot, rule-engine-core
// ============================================================================

//! ## Overview
//! [`MetricsRegistry`] wraps a `prometheus::Registry` with the counters,
//! histograms, and gauges spec §4.11 names, and a [`cardinality::CardinalityGuard`]
//! every labeled write passes through first. A forbidden label or a
//! cardinality overflow is [`error::MetricsError`] and records nothing
//! (spec §8 invariant 6).
//!
//! **[AMBIENT]** Grounded on the real `prometheus` crate API (`Registry`,
//! `CounterVec`, `HistogramVec`, `Opts`, `HistogramOpts`) as used in the
//! pack's Polkadot availability-store metrics, rather than the hand-rolled
//! text-format exporter some of the pack's other repos carry — spec §4.11
//! asks for an ecosystem metrics crate, and `prometheus` is already a
//! workspace dependency.

mod cardinality;
mod error;
mod registry;

pub use crate::cardinality::CardinalityGuard;
pub use crate::error::MetricsError;
pub use crate::registry::MetricsRegistry;
