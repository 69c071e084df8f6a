// rule-engine-bus/src/lib.rs
// ============================================================================
// Module: Event Bus / Enqueuer (C3)
// Description: Validates, indexes, gates, and enqueues one event (spec §4.3).
// Purpose: The single entry point onto the durable queue; C9 depends on this
//          crate only through the `EventEnqueuer` trait seam (spec §9).
// Dependencies: rule-engine-core, rule-engine-queue, parking_lot, rand, time
// ============================================================================

//! ## Overview
//! [`EventBus::emit_event`] is the richer, originator-aware entry point used
//! by ingestion callers that already have a fully-populated [`Event`]. The
//! [`EventEnqueuer`] trait implementation is the narrower seam C9 (the
//! schedule manager) depends on: it wraps a bare `(event_type, payload,
//! priority)` into an originator-less event, appropriate for synthesized
//! `Scheduled` ticks that already name their target rule chain inside the
//! payload rather than through C1's index (spec §4.9).
//!
//! Per spec §8 invariant 2, an event with no variable names to index
//! against is skipped rather than enqueued, unless it carries no originator
//! at all (`OriginatorType::None`), in which case routing is left entirely
//! to `event_type` and whatever the payload itself names.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rule_engine_core::AdmitOutcome;
use rule_engine_core::Admission;
use rule_engine_core::BackpressureGate;
pub use rule_engine_core::EnqueueError;
use rule_engine_core::Event;
use rule_engine_core::EventEnqueuer;
use rule_engine_core::EventType;
use rule_engine_core::JobId;
use rule_engine_core::JobOptions;
use rule_engine_core::OriginatorIndex;
use rule_engine_core::OriginatorType;
use rule_engine_core::QueueCounts;
use rule_engine_core::QueueJob;
use rule_engine_core::RejectedReason;
use rule_engine_core::SkippedReason;
use rule_engine_core::Thresholds;
use rule_engine_queue::Queue;
use time::OffsetDateTime;

fn generate_job_id() -> JobId {
    let now = OffsetDateTime::now_utc();
    let suffix: u64 = rand::thread_rng().r#gen();
    JobId::new(format!("job-{}-{suffix:016x}", now.unix_timestamp_nanos()))
}

fn validate(event: &Event) -> Result<(), EnqueueError> {
    if event.originator_type != OriginatorType::None && event.originator_id.is_none() {
        return Err(EnqueueError::InvalidArgument(
            "originator_id is required unless originator_type is none".to_string(),
        ));
    }
    Ok(())
}

/// The event bus: validates one event, resolves its candidate rule chains
/// through C1, applies the backpressure gate, and enqueues a durable job.
pub struct EventBus {
    index: Arc<dyn OriginatorIndex>,
    queue: Arc<Queue>,
    gate: Mutex<BackpressureGate>,
    backpressure_enabled: bool,
}

impl EventBus {
    /// Builds a bus over a shared index and queue.
    #[must_use]
    pub fn new(index: Arc<dyn OriginatorIndex>, queue: Arc<Queue>, thresholds: Thresholds, backpressure_enabled: bool) -> Self {
        Self {
            index,
            queue,
            gate: Mutex::new(BackpressureGate::new(thresholds)),
            backpressure_enabled,
        }
    }

    /// Returns the backpressure gate's current circuit state, read by the
    /// readiness health check (spec §6: "readiness returns 503 when C2's
    /// circuit is `OPEN`").
    #[must_use]
    pub fn circuit_state(&self) -> rule_engine_core::CircuitState {
        self.gate.lock().state()
    }

    /// Validates, indexes, gates, and enqueues one fully-populated event
    /// (spec §4.3). Returns a tagged [`Admission`] outcome rather than an
    /// error for every non-structural case.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError`] only when the event itself is malformed.
    pub async fn emit_event(&self, mut event: Event) -> Result<Admission, EnqueueError> {
        validate(&event)?;

        if event.rule_chain_ids.is_empty() {
            if event.has_no_variables() {
                if event.originator_type != OriginatorType::None {
                    return Ok(Admission::Skipped {
                        reason: SkippedReason::NoVariables,
                    });
                }
            } else if let Some(originator_id) = event.originator_id.clone() {
                match self.index.lookup(event.originator_type, &originator_id, &event.variable_names).await {
                    Ok(ids) if ids.is_empty() => {
                        return Ok(Admission::Skipped {
                            reason: SkippedReason::NoRuleChains,
                        });
                    }
                    Ok(ids) => event.rule_chain_ids = ids,
                    Err(err) => {
                        tracing::warn!(error = %err, "index lookup failed during emit, enqueuing unresolved");
                    }
                }
            } else {
                return Ok(Admission::Skipped {
                    reason: SkippedReason::NoVariables,
                });
            }
        }

        let counts = match self.queue.counts().await {
            Ok(counts) => counts,
            Err(err) => {
                tracing::warn!(error = %err, "queue counts unavailable, admitting without a depth check");
                QueueCounts::default()
            }
        };

        let outcome = if self.backpressure_enabled {
            self.gate.lock().admit(counts.total_pending(), event.priority, OffsetDateTime::now_utc())
        } else {
            AdmitOutcome {
                accept: true,
                reason: None,
                circuit_state: self.gate.lock().state(),
            }
        };

        if !outcome.accept {
            return Ok(Admission::Rejected {
                reason: outcome.reason.unwrap_or(RejectedReason::QueueCritical),
                queue_depth: counts.total_pending(),
            });
        }

        let payload = serde_json::to_value(&event).map_err(|err| EnqueueError::InvalidArgument(err.to_string()))?;
        let job = QueueJob {
            id: generate_job_id(),
            event_type: event.event_type.clone(),
            payload,
            priority: event.priority,
            attempts_made: 0,
            options: JobOptions::default(),
        };

        match self.queue.enqueue(&job).await {
            Ok(()) => Ok(Admission::Accepted {
                job_id: job.id,
                rule_chain_ids: event.rule_chain_ids,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "queue enqueue failed");
                Ok(Admission::Rejected {
                    reason: RejectedReason::EnqueueError,
                    queue_depth: counts.total_pending(),
                })
            }
        }
    }
}

#[async_trait]
impl EventEnqueuer for EventBus {
    async fn emit(&self, event_type: EventType, payload: serde_json::Value, priority: Option<u8>) -> Result<Admission, EnqueueError> {
        let priority = priority.unwrap_or_else(|| Event::default_priority(&event_type));
        let event = Event {
            event_type,
            originator_type: OriginatorType::None,
            originator_id: None,
            variable_names: Vec::new(),
            payload,
            priority,
            rule_chain_ids: Vec::new(),
            enqueued_at: OffsetDateTime::now_utc(),
        };
        self.emit_event(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_originator_without_id() {
        let event = Event {
            event_type: EventType::TelemetryData,
            originator_type: OriginatorType::Sensor,
            originator_id: None,
            variable_names: vec![rule_engine_core::VariableName::new("temperature")],
            payload: serde_json::Value::Null,
            priority: 5,
            rule_chain_ids: Vec::new(),
            enqueued_at: OffsetDateTime::now_utc(),
        };
        assert!(validate(&event).is_err());
    }

    #[test]
    fn generated_job_ids_are_distinct() {
        let a = generate_job_id();
        let b = generate_job_id();
        assert_ne!(a, b);
    }
}
