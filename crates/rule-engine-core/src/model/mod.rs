// rule-engine-core/src/model/mod.rs
// ============================================================================
// Module: Data Model
// Description: The persistent and ephemeral types from spec §3.
// Purpose: Single location for every shape shared across rule-engine crates.
// Dependencies: serde, time, rule-logic
// ============================================================================

//! ## Overview
//! Every type here corresponds to an entity named in spec §3: `Event`,
//! `RuleChain`/`RuleChainNode`, `Index Entry` (owned by the index crate,
//! referenced here only via ids), `Queue Job`, `Snapshot`, the per-chain
//! circuit breaker (see [`crate::breaker`]), `ScheduleRecord`, plus the
//! `[SUPPLEMENT]` `DeviceStateInstance` and `TelemetryData`/`DataStream`
//! rows.

pub mod admission;
pub mod device_state;
pub mod event;
pub mod ids;
pub mod queue;
pub mod rule_chain;
pub mod schedule;
pub mod snapshot;

pub use admission::Admission;
pub use device_state::DeviceStateInstance;
pub use device_state::InitiatedBy;
pub use device_state::TelemetryData;
pub use event::Event;
pub use event::EventType;
pub use event::OriginatorType;
pub use ids::DeviceStateInstanceId;
pub use ids::JobId;
pub use ids::OrganizationId;
pub use ids::OriginatorId;
pub use ids::RuleChainId;
pub use ids::RuleChainNodeId;
pub use ids::TelemetryDataId;
pub use ids::VariableName;
pub use queue::Backoff;
pub use queue::JobOptions;
pub use queue::QueueCounts;
pub use queue::QueueHealth;
pub use queue::QueueJob;
pub use rule_chain::ActionValue;
pub use rule_chain::Comparator;
pub use rule_chain::ExecutionType;
pub use rule_chain::FilterLeaf;
pub use rule_chain::NodeConfig;
pub use rule_chain::RuleChain;
pub use rule_chain::RuleChainNode;
pub use schedule::ScheduleRecord;
pub use schedule::ScheduleState;
pub use snapshot::OriginatorRecord;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotValue;
