// rule-engine-core/src/model/snapshot.rs
// ============================================================================
// Module: Snapshot
// Description: The ephemeral, per-execution data snapshot (spec §3, §4.8).
// Purpose: Minimal latest-value view a rule chain executes against.
// Dependencies: serde, time
// ============================================================================

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::model::event::OriginatorType;
use crate::model::ids::OriginatorId;
use crate::model::ids::VariableName;

/// A coerced snapshot value (spec §3's datatype coercion: `number`, `boolean`,
/// otherwise string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotValue {
    /// A coerced numeric value.
    Number(f64),
    /// A coerced boolean value.
    Boolean(bool),
    /// Any other declared datatype, carried as a string.
    String(String),
}

// Snapshot values come from coerced telemetry, never NaN in practice; Eq is
// required so `FilterLeaf` (which embeds a literal `SnapshotValue`) can derive it.
impl Eq for SnapshotValue {}

impl SnapshotValue {
    /// Coerces a raw string value by its declared datatype (spec §4.8).
    #[must_use]
    pub fn coerce(raw: &str, datatype: &str) -> Self {
        match datatype {
            "number" => raw.parse::<f64>().map_or_else(|_| Self::String(raw.to_string()), Self::Number),
            "boolean" => Self::Boolean(matches!(raw.to_ascii_lowercase().as_str(), "true" | "1" | "yes")),
            _ => Self::String(raw.to_string()),
        }
    }
}

/// One originator's variable-to-value map at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginatorRecord {
    /// The originator's identifier.
    pub uuid: OriginatorId,
    /// Variable/state name to coerced value.
    pub values: HashMap<VariableName, SnapshotValue>,
    /// When these values were recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// The minimal latest-value view a rule chain executes against (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Per-sensor records, keyed by originator id.
    #[serde(default)]
    pub sensor_data: HashMap<OriginatorId, OriginatorRecord>,
    /// Per-device records, keyed by originator id.
    #[serde(default)]
    pub device_data: HashMap<OriginatorId, OriginatorRecord>,
}

impl Snapshot {
    /// Looks up a single `(sourceType, uuid, key)` value.
    ///
    /// Returns `None` when the originator or key is unresolved in this
    /// snapshot; callers must treat that as "unsatisfied", never as an error
    /// (spec §4.7).
    #[must_use]
    pub fn lookup(
        &self,
        source_type: OriginatorType,
        uuid: &OriginatorId,
        key: &VariableName,
    ) -> Option<&SnapshotValue> {
        let table = match source_type {
            OriginatorType::Sensor => &self.sensor_data,
            OriginatorType::Device => &self.device_data,
            OriginatorType::None => return None,
        };
        table.get(uuid)?.values.get(key)
    }

    /// Writes a transform node's output back into the snapshot under
    /// `variable`, scoped to `uuid` in the given table.
    pub fn write_back(
        &mut self,
        source_type: OriginatorType,
        uuid: &OriginatorId,
        variable: &VariableName,
        value: SnapshotValue,
        at: OffsetDateTime,
    ) {
        let table = match source_type {
            OriginatorType::Sensor => &mut self.sensor_data,
            OriginatorType::Device => &mut self.device_data,
            OriginatorType::None => return,
        };
        let record = table.entry(uuid.clone()).or_insert_with(|| OriginatorRecord {
            uuid: uuid.clone(),
            values: HashMap::new(),
            timestamp: at,
        });
        record.values.insert(variable.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercion_matches_scenario_s5() {
        let value = SnapshotValue::coerce("25.5", "number");
        assert_eq!(value, SnapshotValue::Number(25.5));
    }

    #[test]
    fn non_numeric_datatype_falls_back_to_string() {
        let value = SnapshotValue::coerce("abc", "number");
        assert_eq!(value, SnapshotValue::String("abc".to_string()));
    }

    #[test]
    fn lookup_on_missing_originator_is_none() {
        let snapshot = Snapshot::default();
        let id = OriginatorId::new("x");
        let key = VariableName::new("temperature");
        assert!(snapshot.lookup(OriginatorType::Sensor, &id, &key).is_none());
    }
}
