// rule-engine-core/src/model/queue.rs
// ============================================================================
// Module: Queue Job
// Description: The durable priority queue's job shape (spec §3, §4.4).
// Purpose: Typed job body and retry/backoff options shared by C3, C4, C6.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::model::ids::JobId;

/// Backoff strategy applied between retry attempts (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    /// Exponential backoff with the given base delay in milliseconds.
    Exponential {
        /// Base delay in milliseconds; attempt `n` waits `base * 2^(n-1)`.
        base_delay_ms: u64,
    },
}

impl Backoff {
    /// The default backoff policy (spec §4.4: `exponential(base=500ms)`).
    #[must_use]
    pub const fn default_policy() -> Self {
        Self::Exponential {
            base_delay_ms: 500,
        }
    }

    /// Computes the delay before the given 1-indexed attempt.
    #[must_use]
    pub fn delay_ms(self, attempt: u32) -> u64 {
        match self {
            Self::Exponential {
                base_delay_ms,
            } => base_delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(32)),
        }
    }
}

/// Options governing a queue job's lifecycle (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Maximum delivery attempts before the job is dead-lettered.
    pub attempts: u32,
    /// Backoff policy between attempts.
    pub backoff: Backoff,
    /// Maximum number of completed jobs retained (bounded trim).
    pub remove_on_complete: u32,
    /// Maximum number of failed jobs retained (bounded trim).
    pub remove_on_fail: u32,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::default_policy(),
            remove_on_complete: 1000,
            remove_on_fail: 5000,
        }
    }
}

/// A durable priority-queue job (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    /// Unique job identifier, assigned by the queue on enqueue.
    pub id: JobId,
    /// The event type carried in this job's body (spec §6).
    pub event_type: crate::model::event::EventType,
    /// The job body payload.
    pub payload: serde_json::Value,
    /// Priority, 1..10, lower is higher priority.
    pub priority: u8,
    /// Attempts made so far.
    pub attempts_made: u32,
    /// Lifecycle and retry options.
    pub options: JobOptions,
}

impl QueueJob {
    /// Returns true when another delivery attempt is permitted.
    #[must_use]
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts_made < self.options.attempts
    }
}

/// Point-in-time counts the backpressure gate and health checks consult
/// (spec §4.2, §4.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Jobs waiting to be picked up.
    pub waiting: u64,
    /// Jobs currently leased to a worker.
    pub active: u64,
    /// Jobs that completed successfully and have not yet been trimmed.
    pub completed: u64,
    /// Jobs that exhausted their attempts and moved to the dead set.
    pub failed: u64,
    /// Jobs scheduled for future delivery.
    pub delayed: u64,
    /// Whether the queue is currently paused.
    pub paused: bool,
}

impl QueueCounts {
    /// `waiting + active`, the figure the backpressure gate reasons about.
    #[must_use]
    pub const fn total_pending(self) -> u64 {
        self.waiting + self.active
    }
}

/// Aggregated health derived from queue depth against the backpressure
/// thresholds (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueHealth {
    /// Below the warning threshold.
    Healthy,
    /// At or above the warning threshold.
    Degraded,
    /// Approaching the critical threshold (reserved for future use).
    Warning,
    /// At or above the critical threshold.
    Critical,
}
