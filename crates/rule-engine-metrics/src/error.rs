// rule-engine-metrics/src/error.rs
// ============================================================================
// Module: Metrics Errors
// Description: The cardinality-guard and registration error taxonomy (spec
//              §4.11, §7 Fatal).
// Dependencies: prometheus, thiserror
// ============================================================================

/// Errors raised by [`crate::MetricsRegistry`] (spec §4.11, §7: a forbidden
/// label or a cardinality overflow is `Fatal` — it must not retry, and no
/// metric is recorded).
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A label name is on the deny-list (spec §4.11).
    #[error("label {label} is forbidden")]
    ForbiddenLabel {
        /// The rejected label name.
        label: String,
    },
    /// A label value would push an allow-listed label over its cardinality cap.
    #[error("label {label} exceeded its cardinality cap of {max}")]
    CardinalityExceeded {
        /// The label name that overflowed.
        label: String,
        /// The configured cap for this label.
        max: usize,
    },
    /// A label name is not on the allow-list and not on the deny-list either.
    #[error("label {label} is not a recognized metric label")]
    UnknownLabel {
        /// The unrecognized label name.
        label: String,
    },
    /// The underlying `prometheus` registration or observation call failed.
    #[error("prometheus registration failed: {0}")]
    Registration(#[from] prometheus::Error),
}
