// rule-engine-core/src/model/admission.rs
// ============================================================================
// Module: Admission
// Description: The tagged outcome of C3's `emit` operation (spec §9 redesign).
// Purpose: Replace the source's dynamic/untagged admission payloads with an
//          explicit, exhaustively-matchable enum.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::error::RejectedReason;
use crate::error::SkippedReason;
use crate::model::ids::JobId;
use crate::model::ids::RuleChainId;

/// The tagged outcome of `EventEnqueuer::emit` (spec §9: `Admission =
/// Accepted{job} | Rejected{reason, queueDepth} | Skipped{reason}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum Admission {
    /// The event was enqueued.
    Accepted {
        /// The job id assigned by the durable queue.
        job_id: JobId,
        /// Rule chains resolved as matching, attached for C6 to reuse.
        rule_chain_ids: Vec<RuleChainId>,
    },
    /// Backpressure rejected the event before enqueue.
    Rejected {
        /// Why the event was rejected.
        reason: RejectedReason,
        /// The queue depth observed at rejection time.
        queue_depth: u64,
    },
    /// An optimization skipped the event without enqueuing.
    Skipped {
        /// Why the event was skipped.
        reason: SkippedReason,
    },
}

impl Admission {
    /// Returns true when this outcome enqueued a job.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}
