// rule-engine-core/src/breaker.rs
// ============================================================================
// Module: Per-Chain Circuit Breaker
// Description: The C6 per-rule-chain circuit breaker state machine (spec
//              §3, §4.6, §8 invariant 4, §9 design notes).
// Purpose: Isolate a misbehaving chain without a "this-rich" ad-hoc timer
//          object; transitions are a pure function of
//          `(prevState, now, failures)`.
// Dependencies: time, serde
// ============================================================================

//! ## Overview
//! Per spec §9: *"this-rich" circuit breakers with ad-hoc timer fields* are
//! redesigned as a small state machine whose transitions are functions of
//! `(prevState, now, ...)`. [`ChainBreaker`] holds only the fields needed to
//! decide the next state; [`ChainBreaker::on_call`] and
//! [`ChainBreaker::record_outcome`] are the only mutators.

use serde::Deserialize;
use serde::Serialize;
use time::Duration;
use time::OffsetDateTime;

/// The three states of a per-chain circuit breaker (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakerState {
    /// Calls pass through normally.
    Closed,
    /// Rejecting calls; waiting for `recovery_timeout` to elapse.
    Open,
    /// Trialing a single call to decide whether to close or reopen.
    HalfOpen,
}

/// Default consecutive-failure threshold before opening (spec §4.6, §9 open question).
pub const DEFAULT_THRESHOLD: u32 = 5;
/// Default recovery timeout before a trial call is admitted (spec §4.6).
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::seconds(60);

/// Per-chain circuit breaker state (spec §3: `{failures, state, openedUntil?,
/// threshold, recoveryTimeout}`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChainBreaker {
    /// Consecutive failures observed since the breaker last closed.
    pub failures: u32,
    /// Current state.
    pub state: BreakerState,
    /// When an `Open` breaker becomes eligible for a trial call.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub opened_until: Option<OffsetDateTime>,
    /// Consecutive-failure threshold that opens the breaker.
    pub threshold: u32,
    /// How long the breaker stays open before trialing, in whole seconds.
    pub recovery_timeout_secs: i64,
}

/// The outcome of consulting the breaker before a call (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    /// The call may proceed.
    Proceed,
    /// The call must be skipped; breaker is open and not yet eligible for trial.
    Skip,
}

impl ChainBreaker {
    /// Creates a closed breaker with the given threshold and recovery timeout.
    #[must_use]
    pub const fn new(threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failures: 0,
            state: BreakerState::Closed,
            opened_until: None,
            threshold,
            recovery_timeout_secs: recovery_timeout.whole_seconds(),
        }
    }

    /// Consults the breaker for an incoming call at `now`, performing the
    /// `open (past recoveryTimeout) -> halfOpen` transition in place
    /// (spec §4.6: "open past recoveryTimeout: transition to halfOpen, admit
    /// one call").
    pub fn on_call(&mut self, now: OffsetDateTime) -> Admit {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => Admit::Proceed,
            BreakerState::Open => {
                let eligible = self.opened_until.is_none_or(|until| now >= until);
                if eligible {
                    self.state = BreakerState::HalfOpen;
                    Admit::Proceed
                } else {
                    Admit::Skip
                }
            }
        }
    }

    /// Records the outcome of a call admitted by [`Self::on_call`].
    ///
    /// Success resets failures to zero and closes a `HalfOpen` breaker.
    /// Failure increments the failure count; reaching `threshold` opens the
    /// breaker for `recoveryTimeout` (spec §4.6, §8 invariant 4).
    pub fn record_outcome(&mut self, success: bool, now: OffsetDateTime) {
        if success {
            self.failures = 0;
            self.state = BreakerState::Closed;
            self.opened_until = None;
            return;
        }

        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.threshold {
            self.state = BreakerState::Open;
            self.opened_until = Some(now + Duration::seconds(self.recovery_timeout_secs));
            tracing::warn!(failures = self.failures, "chain breaker opened");
        } else if self.state == BreakerState::HalfOpen {
            // A failed trial call reopens immediately without waiting for
            // another full threshold of failures.
            self.state = BreakerState::Open;
            self.opened_until = Some(now + Duration::seconds(self.recovery_timeout_secs));
            tracing::warn!("chain breaker trial failed, reopening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(seconds)
    }

    #[test]
    fn five_failures_open_the_breaker_scenario_s3() {
        let mut breaker = ChainBreaker::new(DEFAULT_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT);
        for _ in 0..5 {
            assert_eq!(breaker.on_call(t(0)), Admit::Proceed);
            breaker.record_outcome(false, t(0));
        }
        assert_eq!(breaker.state, BreakerState::Open);
        assert_eq!(breaker.on_call(t(0)), Admit::Skip);
    }

    #[test]
    fn breaker_trials_after_recovery_timeout_and_closes_on_success() {
        let mut breaker = ChainBreaker::new(DEFAULT_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT);
        for _ in 0..5 {
            breaker.record_outcome(false, t(0));
        }
        assert_eq!(breaker.on_call(t(30)), Admit::Skip);
        assert_eq!(breaker.on_call(t(61)), Admit::Proceed);
        assert_eq!(breaker.state, BreakerState::HalfOpen);
        breaker.record_outcome(true, t(61));
        assert_eq!(breaker.state, BreakerState::Closed);
        assert_eq!(breaker.failures, 0);
    }

    #[test]
    fn failed_trial_reopens() {
        let mut breaker = ChainBreaker::new(DEFAULT_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT);
        for _ in 0..5 {
            breaker.record_outcome(false, t(0));
        }
        assert_eq!(breaker.on_call(t(61)), Admit::Proceed);
        breaker.record_outcome(false, t(61));
        assert_eq!(breaker.state, BreakerState::Open);
    }
}
