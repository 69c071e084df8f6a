// rule-engine-core/src/model/device_state.rs
// ============================================================================
// Module: Device State & Telemetry Rows
// Description: [SUPPLEMENT] relational row shapes C10 writes and C8 reads
//              (spec §3 SUPPLEMENT, §6 relational store).
// Purpose: Concrete persisted shapes behind the `device`/`sensor` originator
//          lookups the collector and bridge perform.
// Dependencies: serde, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::model::ids::DeviceStateInstanceId;
use crate::model::ids::OriginatorId;
use crate::model::ids::TelemetryDataId;
use crate::model::ids::VariableName;

/// Who or what initiated a device-state write (spec §4.10 contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiatedBy {
    /// Written by C10 on behalf of a rule-chain action.
    RuleChain,
    /// Written by an external collaborator (device report, manual API call).
    External,
}

/// A persisted device-state instance (spec §3 SUPPLEMENT), written by C10
/// and read back by C8 as the latest-value source for `device` originators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateInstance {
    /// Row identifier.
    pub id: DeviceStateInstanceId,
    /// The device this state instance belongs to.
    pub device_id: OriginatorId,
    /// The state attribute name, e.g. `power`.
    pub state_name: VariableName,
    /// The coerced value, stored as a JSON scalar.
    pub value: serde_json::Value,
    /// What initiated this write.
    pub initiated_by: InitiatedBy,
    /// Free-form metadata (used by C10 to flag critical devices, see §4.10).
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// When this instance was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

/// A persisted telemetry/data-stream row (spec §3 SUPPLEMENT), read by C8
/// for `sensor` originators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryData {
    /// Row identifier.
    pub id: TelemetryDataId,
    /// The sensor this reading belongs to.
    pub sensor_id: OriginatorId,
    /// The variable name, e.g. `temperature`.
    pub variable_name: VariableName,
    /// The raw value as stored (coerced by C8 per the declared datatype).
    pub value: String,
    /// The declared datatype (`number`, `boolean`, otherwise treated as string).
    pub datatype: String,
    /// When this reading was received.
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}
