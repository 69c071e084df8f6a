// rule-engine-metrics/src/cardinality.rs
// ============================================================================
// Module: Cardinality Guard
// Description: The fixed label allow-list/deny-list and per-label
//              cardinality caps every metric write passes through (spec
//              §4.11, §8 invariant 6).
// Purpose: No call site can record a metric with a forbidden label or blow
//          past a label's cardinality cap; the guard is the single place
//          that decision is made.
// Dependencies: std (HashMap/HashSet of observed label values)
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;

use crate::error::MetricsError;

/// Labels that must never be attached to a metric (spec §4.11): anything
/// that carries per-entity identity explodes cardinality unboundedly.
const DENY_LIST: [&str; 8] = ["sensorUUID", "deviceUUID", "userId", "telemetryDataId", "jobId", "requestId", "sessionId", "deviceToken"];

/// The recognized label names and their per-label maximum cardinality (spec
/// §4.11's example caps; chosen to bound each label's realistic domain size).
const ALLOW_LIST: [(&str, usize); 10] = [
    ("ruleChainId", 200),
    ("organizationId", 100),
    ("status", 5),
    ("type", 10),
    ("method", 8),
    ("route", 50),
    ("status_code", 20),
    ("protocol", 5),
    ("result", 5),
    ("actionType", 20),
];

/// Tracks, per label name, the distinct values observed so far and rejects
/// writes that are forbidden or would overflow the label's cap (spec §4.11,
/// §8 invariant 6: "no metric is recorded on failure").
#[derive(Debug, Default)]
pub struct CardinalityGuard {
    caps: HashMap<&'static str, usize>,
    observed: HashMap<String, HashSet<String>>,
}

impl CardinalityGuard {
    /// Builds a guard with the fixed allow-list caps (spec §4.11).
    #[must_use]
    pub fn new() -> Self {
        Self {
            caps: ALLOW_LIST.into_iter().collect(),
            observed: HashMap::new(),
        }
    }

    /// Checks and, on success, records one `(label, value)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::ForbiddenLabel`] for a deny-listed label,
    /// [`MetricsError::UnknownLabel`] for a label on neither list, or
    /// [`MetricsError::CardinalityExceeded`] when a new value would push an
    /// allow-listed label past its cap.
    pub fn check(&mut self, label: &str, value: &str) -> Result<(), MetricsError> {
        if DENY_LIST.contains(&label) {
            return Err(MetricsError::ForbiddenLabel { label: label.to_string() });
        }
        let Some((&allowed_label, &max)) = self.caps.get_key_value(label) else {
            return Err(MetricsError::UnknownLabel { label: label.to_string() });
        };
        let values = self.observed.entry(allowed_label.to_string()).or_default();
        if values.contains(value) {
            return Ok(());
        }
        if values.len() >= max {
            return Err(MetricsError::CardinalityExceeded { label: label.to_string(), max });
        }
        values.insert(value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_denylisted_label() {
        let mut guard = CardinalityGuard::new();
        let err = guard.check("deviceUUID", "d-1").unwrap_err();
        assert!(matches!(err, MetricsError::ForbiddenLabel { .. }));
    }

    #[test]
    fn rejects_unknown_label() {
        let mut guard = CardinalityGuard::new();
        let err = guard.check("whatever", "x").unwrap_err();
        assert!(matches!(err, MetricsError::UnknownLabel { .. }));
    }

    #[test]
    fn repeated_value_does_not_count_twice() {
        let mut guard = CardinalityGuard::new();
        guard.check("status", "ok").unwrap();
        guard.check("status", "ok").unwrap();
        guard.check("status", "ok").unwrap();
        assert_eq!(guard.observed.get("status").map(HashSet::len), Some(1));
    }

    #[test]
    fn exceeding_cap_is_rejected() {
        let mut guard = CardinalityGuard::new();
        for i in 0..5 {
            guard.check("status", &format!("s{i}")).unwrap();
        }
        let err = guard.check("status", "s5").unwrap_err();
        assert!(matches!(err, MetricsError::CardinalityExceeded { max: 5, .. }));
    }
}
