// rule-engine-queue/src/keys.rs
// ============================================================================
// Module: Queue Key Scheme
// Description: Redis key names for one named durable queue (spec §4.4).
// Purpose: Centralize the key scheme so every operation agrees on it.
// Dependencies: none
// ============================================================================

/// The Redis keys backing one named queue.
///
/// A queue's state lives in six structures: a `waiting` sorted set scored by
/// `(priority, enqueued_at)` for pop ordering, a `delayed` sorted set scored
/// by readiness time for jobs in backoff, an `active` sorted set scored by
/// lease expiry for stall detection, a `jobs` hash holding each job's
/// serialized body, and `completed`/`failed` bounded lists. `paused` is a
/// plain flag key.
pub(crate) struct QueueKeys {
    pub waiting: String,
    pub delayed: String,
    pub active: String,
    pub jobs: String,
    pub completed: String,
    pub failed: String,
    pub paused: String,
}

impl QueueKeys {
    pub(crate) fn new(queue_name: &str) -> Self {
        Self {
            waiting: format!("rule-engine:queue:{queue_name}:waiting"),
            delayed: format!("rule-engine:queue:{queue_name}:delayed"),
            active: format!("rule-engine:queue:{queue_name}:active"),
            jobs: format!("rule-engine:queue:{queue_name}:jobs"),
            completed: format!("rule-engine:queue:{queue_name}:completed"),
            failed: format!("rule-engine:queue:{queue_name}:failed"),
            paused: format!("rule-engine:queue:{queue_name}:paused"),
        }
    }
}
