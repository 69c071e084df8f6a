// rule-engine-core/src/error.rs
// ============================================================================
// Module: Core Error Taxonomy
// Description: Shared error taxonomy used across the rule-engine crates.
// Purpose: Give every component the same vocabulary for admission, skip,
//          rejection, timeout, and fatal outcomes (spec §7).
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every crate in this workspace defines its own `thiserror` error enum for
//! its own boundary (`IndexError`, `QueueError`, `WorkerError`, ...). This
//! module holds the handful of types that are genuinely shared: the
//! `EngineError` taxonomy from the error handling design, and the timeout
//! code enum referenced by several components.

use thiserror::Error;

/// The structured timeout codes a bounded operation can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutCode {
    /// C8 data collection exceeded its budget.
    DataCollectionTimeout,
    /// C7 rule-chain execution exceeded its budget.
    RuleChainTimeout,
    /// A worker-level operation exceeded its budget.
    WorkerTimeout,
    /// C10 delivery of an external action exceeded its budget.
    ExternalActionTimeout,
}

impl TimeoutCode {
    /// Returns the stable metric label for this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataCollectionTimeout => "DATA_COLLECTION_TIMEOUT",
            Self::RuleChainTimeout => "RULE_CHAIN_TIMEOUT",
            Self::WorkerTimeout => "WORKER_TIMEOUT",
            Self::ExternalActionTimeout => "EXTERNAL_ACTION_TIMEOUT",
        }
    }
}

impl std::fmt::Display for TimeoutCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an event or job was rejected by backpressure (spec §4.2, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectedReason {
    /// Queue depth is at or above the critical threshold.
    QueueCritical,
    /// The backpressure circuit is open.
    CircuitOpen,
    /// A low-priority event was shed under pressure.
    LowPriorityShed,
    /// The durable queue failed to accept the job.
    EnqueueError,
}

impl RejectedReason {
    /// Returns the stable string used in admission results and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueueCritical => "queue-critical",
            Self::CircuitOpen => "circuit-open",
            Self::LowPriorityShed => "low-priority-shed",
            Self::EnqueueError => "enqueue-error",
        }
    }
}

impl std::fmt::Display for RejectedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons an event or chain invocation was skipped as an optimization
/// (spec §4.3, §4.6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SkippedReason {
    /// The event carried no variable names to index against.
    #[serde(rename = "no-variables")]
    NoVariables,
    /// No rule chain references any of the event's variables.
    #[serde(rename = "no-rule-chains")]
    NoRuleChains,
    /// Candidate chains exist but none are event-eligible.
    #[serde(rename = "no-event-rules")]
    NoEventRules,
    /// The per-chain circuit breaker is open.
    #[serde(rename = "circuit_breaker_open")]
    CircuitBreakerOpen,
}

impl SkippedReason {
    /// Returns the stable string used in admission results and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoVariables => "no-variables",
            Self::NoRuleChains => "no-rule-chains",
            Self::NoEventRules => "no-event-rules",
            Self::CircuitBreakerOpen => "circuit_breaker_open",
        }
    }
}

impl std::fmt::Display for SkippedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shared error taxonomy described in spec §7.
///
/// Each crate boundary defines its own richer error enum and converts into
/// or out of this taxonomy at the point where the distinction actually
/// matters to a caller (retry scheduling, health reporting, metrics).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad event shape, unknown `sourceType`, or malformed cron expression.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced rule chain, device, or sensor is missing at execution time.
    #[error("not found: {0}")]
    NotFound(String),

    /// A bounded operation exceeded its timeout budget.
    #[error("timeout: {0}")]
    Timeout(TimeoutCode),

    /// Backpressure rejected the event or job.
    #[error("rejected: {0}")]
    Rejected(RejectedReason),

    /// An optimization skipped the event or invocation without error.
    #[error("skipped: {0}")]
    Skipped(SkippedReason),

    /// A retryable cache/store error; the queue substrate will retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// A structural error that must not be retried.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Returns true when the queue substrate should retry the job that
    /// produced this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}
