// rule-engine-core/src/model/event.rs
// ============================================================================
// Module: Event
// Description: The immutable, in-flight event envelope (spec §3).
// Purpose: Carry everything C3-C6 need to route and dispatch one occurrence.
// Dependencies: serde, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::model::ids::OriginatorId;
use crate::model::ids::RuleChainId;
use crate::model::ids::VariableName;

/// The kind of originator an event's variables belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginatorType {
    /// A telemetry-producing sensor.
    Sensor,
    /// A stateful device.
    Device,
    /// No originator; the event is routed by `eventType` alone.
    None,
}

/// The recognized event types (spec §6 event envelope).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventType {
    /// A new telemetry reading.
    TelemetryData,
    /// A device state transition.
    DeviceStateChange,
    /// A synthesized schedule tick (spec §4.9).
    Scheduled,
    /// A bulk/administrative event.
    BatchOperation,
    /// A manually triggered rule-chain run, bypassing the execution-type filter (spec §4.5).
    ManualTrigger,
    /// An event type recognized only by external collaborators.
    External,
}

/// An immutable, in-flight event (spec §3).
///
/// Invariant: if `originator_type != OriginatorType::None` then
/// `originator_id` is `Some`. `variable_names` may be empty, in which case
/// the event is routed by `event_type` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// The event's type, used for worker dispatch (spec §4.6).
    pub event_type: EventType,
    /// The kind of originator this event's variables belong to.
    pub originator_type: OriginatorType,
    /// The originator identifier, required unless `originator_type` is `None`.
    pub originator_id: Option<OriginatorId>,
    /// Ordered, distinct variable names this event reports on.
    pub variable_names: Vec<VariableName>,
    /// Opaque, event-type-specific payload.
    pub payload: serde_json::Value,
    /// Priority, 1..10, lower is higher priority (spec §4.3 defaults).
    pub priority: u8,
    /// Rule-chain IDs already resolved for this event, attached by C3 so C6
    /// need not re-query C1.
    #[serde(default)]
    pub rule_chain_ids: Vec<RuleChainId>,
    /// When this event was created.
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
}

impl Event {
    /// Default priority for a given event type (spec §4.3).
    #[must_use]
    pub const fn default_priority(event_type: &EventType) -> u8 {
        match event_type {
            EventType::Scheduled => 1,
            EventType::TelemetryData | EventType::DeviceStateChange => 5,
            EventType::BatchOperation => 10,
            EventType::ManualTrigger | EventType::External => 5,
        }
    }

    /// Returns true when this event carries no variable names to index against.
    #[must_use]
    pub fn has_no_variables(&self) -> bool {
        self.variable_names.is_empty()
    }
}
