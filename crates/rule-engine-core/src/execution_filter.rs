// rule-engine-core/src/execution_filter.rs
// ============================================================================
// Module: Execution-Type Filter (C5)
// Description: Splits candidate rule chains into event-eligible vs
//              schedule-eligible subsets (spec §4.5, §8 invariant 5).
// Purpose: Keep schedule-only chains from firing off events and vice versa.
// Dependencies: none
// ============================================================================

//! ## Overview
//! A pure, fallible-but-fail-open function: callers pass a lookup closure
//! instead of a store handle so this crate stays free of I/O. On lookup
//! failure the filter returns every candidate unchanged (fail-open) and
//! reports how many it would otherwise have excluded (spec §4.5: "record a
//! metric").

use crate::model::ids::RuleChainId;
use crate::model::rule_chain::ExecutionType;

/// The invocation kind driving eligibility (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    /// Triggered by a matching event.
    Event,
    /// Triggered by the schedule manager.
    Schedule,
}

/// The result of filtering a candidate set (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    /// The chains eligible for this invocation kind.
    pub eligible: Vec<RuleChainId>,
    /// How many candidates were excluded (0 when fail-open was triggered).
    pub excluded_count: usize,
    /// Whether this result is the fail-open fallback (lookup failure).
    pub fail_open: bool,
}

/// Filters `candidates` by `kind`, using `lookup` to resolve each chain's
/// execution type. Manual triggers should bypass this filter entirely at
/// the call site (spec §4.5: "Manual triggers bypass the filter").
///
/// `lookup` returning `None` for any candidate is treated as a lookup
/// failure for the whole batch and triggers fail-open.
pub fn filter_by_execution_type<F>(
    candidates: &[RuleChainId],
    kind: InvocationKind,
    lookup: F,
) -> FilterOutcome
where
    F: Fn(&RuleChainId) -> Option<ExecutionType>,
{
    let mut eligible = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match lookup(candidate) {
            Some(execution_type) => {
                let allowed = match kind {
                    InvocationKind::Event => execution_type.allows_event(),
                    InvocationKind::Schedule => execution_type.allows_schedule(),
                };
                if allowed {
                    eligible.push(candidate.clone());
                }
            }
            None => {
                return FilterOutcome {
                    eligible: candidates.to_vec(),
                    excluded_count: 0,
                    fail_open: true,
                };
            }
        }
    }

    FilterOutcome {
        excluded_count: candidates.len() - eligible.len(),
        eligible,
        fail_open: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_only_never_runs_from_event_invariant_5() {
        let chains = vec![RuleChainId::new("a")];
        let outcome =
            filter_by_execution_type(&chains, InvocationKind::Event, |_| Some(ExecutionType::ScheduleOnly));
        assert!(outcome.eligible.is_empty());
        assert_eq!(outcome.excluded_count, 1);
    }

    #[test]
    fn hybrid_runs_from_both_invocation_kinds() {
        let chains = vec![RuleChainId::new("a")];
        for kind in [InvocationKind::Event, InvocationKind::Schedule] {
            let outcome = filter_by_execution_type(&chains, kind, |_| Some(ExecutionType::Hybrid));
            assert_eq!(outcome.eligible, chains);
        }
    }

    #[test]
    fn lookup_failure_fails_open() {
        let chains = vec![RuleChainId::new("a"), RuleChainId::new("b")];
        let outcome = filter_by_execution_type(&chains, InvocationKind::Event, |_| None);
        assert!(outcome.fail_open);
        assert_eq!(outcome.eligible, chains);
    }
}
