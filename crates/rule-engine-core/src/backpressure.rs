// rule-engine-core/src/backpressure.rs
// ============================================================================
// Module: Backpressure Gate (C2)
// Description: Three-state circuit breaker over global queue depth (spec
//              §4.2, §8 invariant 3, §9 design notes).
// Purpose: Pure, non-blocking admission function over counts and priority.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`BackpressureGate::admit`] is a pure function of `(prevState, pending,
//! priority)` — no I/O, no sleeping. The gate owns only the counters spec
//! §4.2 calls for (`rejectedCount`, `lastStateChange`) plus throttling state
//! for the warning-band log line.

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::RejectedReason;

/// The three backpressure states (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Rejecting non-override admits.
    Open,
    /// Trial period after recovering from `Open`.
    HalfOpen,
}

/// Backpressure thresholds, in pending-job counts (spec §4.2 defaults:
/// 10k/50k/5k).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Warning band: low-priority shedding begins near this line.
    pub warning: u64,
    /// Critical band: the gate opens at or above this line.
    pub critical: u64,
    /// Recovery band: an open gate may trial once pending falls to this line.
    pub recovery: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: 10_000,
            critical: 50_000,
            recovery: 5_000,
        }
    }
}

/// The outcome of one admission decision (spec §4.2 contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitOutcome {
    /// Whether the event/job may proceed.
    pub accept: bool,
    /// Present when `accept` is false, or when an override applied.
    pub reason: Option<RejectedReason>,
    /// The circuit state after this admission decision.
    pub circuit_state: CircuitState,
}

/// The backpressure gate's mutable state (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressureGate {
    state: CircuitState,
    thresholds: Thresholds,
    rejected_count: u64,
    last_state_change: Option<OffsetDateTime>,
}

impl Default for BackpressureGate {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl BackpressureGate {
    /// Creates a gate starting `Closed` with the given thresholds.
    #[must_use]
    pub const fn new(thresholds: Thresholds) -> Self {
        Self {
            state: CircuitState::Closed,
            thresholds,
            rejected_count: 0,
            last_state_change: None,
        }
    }

    /// Returns the current circuit state.
    #[must_use]
    pub const fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns the total number of rejected admissions observed so far.
    #[must_use]
    pub const fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    fn transition(&mut self, next: CircuitState, now: OffsetDateTime) {
        if next != self.state {
            self.state = next;
            self.last_state_change = Some(now);
        }
    }

    /// Decides admission for one event at priority `priority` given current
    /// `pending` depth, applying the §4.2 transition table first and then
    /// the admission rules for the resulting state.
    pub fn admit(&mut self, pending: u64, priority: u8, now: OffsetDateTime) -> AdmitOutcome {
        match self.state {
            CircuitState::Closed if pending >= self.thresholds.critical => {
                self.transition(CircuitState::Open, now);
            }
            CircuitState::Open if pending <= self.thresholds.recovery => {
                self.transition(CircuitState::HalfOpen, now);
            }
            CircuitState::HalfOpen => {
                let close_at = (self.thresholds.recovery as f64 * 0.6) as u64;
                if pending <= close_at {
                    self.transition(CircuitState::Closed, now);
                } else if pending >= self.thresholds.warning {
                    self.transition(CircuitState::Open, now);
                }
            }
            CircuitState::Closed | CircuitState::Open => {}
        }

        let outcome = self.decide(pending, priority);
        if !outcome.accept {
            self.rejected_count += 1;
        }
        outcome
    }

    fn decide(&self, pending: u64, priority: u8) -> AdmitOutcome {
        if self.state == CircuitState::Open {
            let override_admitted = priority <= 1 && pending >= self.thresholds.critical;
            if override_admitted {
                return AdmitOutcome {
                    accept: true,
                    reason: None,
                    circuit_state: self.state,
                };
            }
            return AdmitOutcome {
                accept: false,
                reason: Some(RejectedReason::CircuitOpen),
                circuit_state: self.state,
            };
        }

        let shed_at = (self.thresholds.critical as f64 * 0.8) as u64;
        if priority > 5 && pending >= shed_at {
            return AdmitOutcome {
                accept: false,
                reason: Some(RejectedReason::LowPriorityShed),
                circuit_state: self.state,
            };
        }

        AdmitOutcome {
            accept: true,
            reason: None,
            circuit_state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    #[test]
    fn scenario_s2_priority_override_under_open() {
        let mut gate = BackpressureGate::default();
        let outcome = gate.admit(55_000, 1, t());
        assert!(outcome.accept);
        assert_eq!(outcome.circuit_state, CircuitState::Open);

        let outcome = gate.admit(55_000, 5, t());
        assert!(!outcome.accept);
        assert_eq!(outcome.reason, Some(RejectedReason::CircuitOpen));
    }

    #[test]
    fn invariant_3_critical_pending_rejects_unless_override() {
        let mut gate = BackpressureGate::default();
        let outcome = gate.admit(50_000, 3, t());
        assert!(!outcome.accept);
    }

    #[test]
    fn half_open_closes_below_sixty_percent_recovery() {
        let mut gate = BackpressureGate::default();
        gate.admit(50_000, 5, t());
        gate.admit(4_000, 5, t());
        assert_eq!(gate.state(), CircuitState::HalfOpen);
        let outcome = gate.admit(2_000, 5, t());
        assert_eq!(outcome.circuit_state, CircuitState::Closed);
    }

    #[test]
    fn low_priority_shed_in_closed_state() {
        let mut gate = BackpressureGate::default();
        let outcome = gate.admit(40_001, 7, t());
        assert!(!outcome.accept);
        assert_eq!(outcome.reason, Some(RejectedReason::LowPriorityShed));
    }
}
