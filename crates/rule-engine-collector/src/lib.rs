// rule-engine-collector/src/lib.rs
// ============================================================================
// Module: Data Collector (C8)
// Description: Batch-queries originator values into a [`Snapshot`] a rule
//              chain executes against (spec §4.8).
// Purpose: One batch store query per `sourceType`, short-TTL cached, before
//          C7 ever evaluates a filter.
// Dependencies: rule-engine-cache, rule-engine-core, rule-engine-store-sqlite
// ============================================================================

//! ## Overview
//! A rule chain's filter leaves name the `(sourceType, uuid, key)` triples it
//! needs (spec §4.7); [`DataCollector::collect`] resolves every triple,
//! preferring [`ValueCache`] over the relational store. Requests that miss
//! the cache are grouped by `sourceType` and resolved with one batch query
//! per group rather than one round trip per triple (spec §4.8, §9: the N+1
//! per-key pattern is an explicit redesign target). A batch query falls
//! back to `rusqlite`, which is synchronous, so it runs on a blocking thread
//! (same pattern as `rule-engine-index`).

use std::collections::HashMap;
use std::sync::Arc;

use rule_engine_cache::ValueCache;
use rule_engine_core::DeviceStateInstance;
use rule_engine_core::OriginatorId;
use rule_engine_core::OriginatorType;
use rule_engine_core::Snapshot;
use rule_engine_core::SnapshotValue;
use rule_engine_core::TelemetryData;
use rule_engine_core::VariableName;
use rule_engine_store_sqlite::SqliteStore;
use time::OffsetDateTime;

/// One `(sourceType, uuid, key)` triple to resolve into the snapshot (spec
/// §4.7). Deliberately narrower than `FilterLeaf`: the collector has no use
/// for a leaf's comparator or literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataRequest {
    /// Whether `uuid` names a sensor or a device.
    pub source_type: OriginatorType,
    /// The originator identifier.
    pub uuid: OriginatorId,
    /// The variable or state attribute name.
    pub key: VariableName,
}

/// Converts a stored device-state JSON scalar into a [`SnapshotValue`].
fn json_to_snapshot_value(value: &serde_json::Value) -> SnapshotValue {
    match value {
        serde_json::Value::Number(number) => number.as_f64().map_or_else(|| SnapshotValue::String(number.to_string()), SnapshotValue::Number),
        serde_json::Value::Bool(flag) => SnapshotValue::Boolean(*flag),
        serde_json::Value::String(text) => SnapshotValue::String(text.clone()),
        other => SnapshotValue::String(other.to_string()),
    }
}

/// Resolves originator values into a [`Snapshot`], caching short-TTL reads
/// in front of the relational store.
pub struct DataCollector {
    store: Arc<SqliteStore>,
    cache: ValueCache,
}

impl DataCollector {
    /// Builds a collector over a shared store and a fresh value cache.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            cache: ValueCache::new(),
        }
    }

    /// Resolves every request into a [`Snapshot`], skipping requests that
    /// resolve to no stored value rather than failing the whole batch (spec
    /// §4.7: unsatisfied lookups are not errors). Cache misses are grouped
    /// by `sourceType` and resolved with one batch store query per group
    /// (spec §4.8, §9), not one query per `(uuid, key)` triple.
    pub async fn collect(&self, requests: &[DataRequest]) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let mut misses = Vec::new();
        for request in requests {
            if let Some(value) = self.cache.get(&request.uuid, &request.key) {
                snapshot.write_back(request.source_type, &request.uuid, &request.key, value, OffsetDateTime::now_utc());
            } else {
                misses.push(request.clone());
            }
        }
        if misses.is_empty() {
            return snapshot;
        }

        let mut device_keys = Vec::new();
        let mut sensor_keys = Vec::new();
        for request in &misses {
            match request.source_type {
                OriginatorType::Device => device_keys.push((request.uuid.clone(), request.key.clone())),
                OriginatorType::Sensor => sensor_keys.push((request.uuid.clone(), request.key.clone())),
                OriginatorType::None => {}
            }
        }

        let (device_values, sensor_values) = tokio::join!(self.fetch_device_batch(device_keys), self.fetch_sensor_batch(sensor_keys));

        for request in &misses {
            let resolved = match request.source_type {
                OriginatorType::Device => device_values
                    .get(&(request.uuid.clone(), request.key.clone()))
                    .map(|instance| (json_to_snapshot_value(&instance.value), instance.recorded_at)),
                OriginatorType::Sensor => sensor_values
                    .get(&(request.uuid.clone(), request.key.clone()))
                    .map(|reading| (SnapshotValue::coerce(&reading.value, &reading.datatype), reading.received_at)),
                OriginatorType::None => None,
            };
            if let Some((value, recorded_at)) = resolved {
                self.cache.set(request.uuid.clone(), request.key.clone(), value.clone());
                snapshot.write_back(request.source_type, &request.uuid, &request.key, value, recorded_at);
            }
        }
        snapshot
    }

    /// Invalidates cached values for one originator, called when C1 tells us
    /// its underlying state changed.
    pub fn invalidate(&self, originator_id: &OriginatorId) {
        self.cache.invalidate_originator(originator_id);
    }

    async fn fetch_device_batch(&self, keys: Vec<(OriginatorId, VariableName)>) -> HashMap<(OriginatorId, VariableName), DeviceStateInstance> {
        if keys.is_empty() {
            return HashMap::new();
        }
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.latest_device_states_batch(&keys)).await {
            Ok(Ok(values)) => values,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "device-state batch read failed, leaving values unsatisfied");
                HashMap::new()
            }
            Err(join_err) => {
                tracing::warn!(error = %join_err, "device-state batch task panicked");
                HashMap::new()
            }
        }
    }

    async fn fetch_sensor_batch(&self, keys: Vec<(OriginatorId, VariableName)>) -> HashMap<(OriginatorId, VariableName), TelemetryData> {
        if keys.is_empty() {
            return HashMap::new();
        }
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.latest_telemetry_batch(&keys)).await {
            Ok(Ok(values)) => values,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "telemetry batch read failed, leaving values unsatisfied");
                HashMap::new()
            }
            Err(join_err) => {
                tracing::warn!(error = %join_err, "telemetry batch task panicked");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rule_engine_core::DeviceStateInstance;
    use rule_engine_core::DeviceStateInstanceId;
    use rule_engine_core::InitiatedBy;
    use rule_engine_core::TelemetryData;
    use rule_engine_core::TelemetryDataId;

    use super::*;

    fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn collects_sensor_and_device_values() {
        let store = store();
        store
            .insert_telemetry_data(&TelemetryData {
                id: TelemetryDataId::new("t1"),
                sensor_id: OriginatorId::new("sensor-1"),
                variable_name: VariableName::new("temperature"),
                value: "21.5".to_string(),
                datatype: "number".to_string(),
                received_at: OffsetDateTime::now_utc(),
            })
            .unwrap();
        store
            .insert_device_state_instance(&DeviceStateInstance {
                id: DeviceStateInstanceId::new("d1"),
                device_id: OriginatorId::new("device-1"),
                state_name: VariableName::new("power"),
                value: serde_json::json!(true),
                initiated_by: InitiatedBy::External,
                metadata: serde_json::Value::Null,
                recorded_at: OffsetDateTime::now_utc(),
            })
            .unwrap();

        let collector = DataCollector::new(store);
        let snapshot = collector
            .collect(&[
                DataRequest {
                    source_type: OriginatorType::Sensor,
                    uuid: OriginatorId::new("sensor-1"),
                    key: VariableName::new("temperature"),
                },
                DataRequest {
                    source_type: OriginatorType::Device,
                    uuid: OriginatorId::new("device-1"),
                    key: VariableName::new("power"),
                },
            ])
            .await;

        assert_eq!(
            snapshot.lookup(OriginatorType::Sensor, &OriginatorId::new("sensor-1"), &VariableName::new("temperature")),
            Some(&SnapshotValue::Number(21.5))
        );
        assert_eq!(
            snapshot.lookup(OriginatorType::Device, &OriginatorId::new("device-1"), &VariableName::new("power")),
            Some(&SnapshotValue::Boolean(true))
        );
    }

    #[tokio::test]
    async fn batches_multiple_misses_of_the_same_source_type() {
        let store = store();
        store
            .insert_telemetry_data(&TelemetryData {
                id: TelemetryDataId::new("t1"),
                sensor_id: OriginatorId::new("sensor-1"),
                variable_name: VariableName::new("temperature"),
                value: "21.5".to_string(),
                datatype: "number".to_string(),
                received_at: OffsetDateTime::now_utc(),
            })
            .unwrap();
        store
            .insert_telemetry_data(&TelemetryData {
                id: TelemetryDataId::new("t2"),
                sensor_id: OriginatorId::new("sensor-2"),
                variable_name: VariableName::new("humidity"),
                value: "55.0".to_string(),
                datatype: "number".to_string(),
                received_at: OffsetDateTime::now_utc(),
            })
            .unwrap();

        let collector = DataCollector::new(store);
        let snapshot = collector
            .collect(&[
                DataRequest {
                    source_type: OriginatorType::Sensor,
                    uuid: OriginatorId::new("sensor-1"),
                    key: VariableName::new("temperature"),
                },
                DataRequest {
                    source_type: OriginatorType::Sensor,
                    uuid: OriginatorId::new("sensor-2"),
                    key: VariableName::new("humidity"),
                },
            ])
            .await;

        assert_eq!(
            snapshot.lookup(OriginatorType::Sensor, &OriginatorId::new("sensor-1"), &VariableName::new("temperature")),
            Some(&SnapshotValue::Number(21.5))
        );
        assert_eq!(
            snapshot.lookup(OriginatorType::Sensor, &OriginatorId::new("sensor-2"), &VariableName::new("humidity")),
            Some(&SnapshotValue::Number(55.0))
        );
    }

    #[tokio::test]
    async fn missing_value_is_skipped_not_errored() {
        let collector = DataCollector::new(store());
        let snapshot = collector
            .collect(&[DataRequest {
                source_type: OriginatorType::Sensor,
                uuid: OriginatorId::new("sensor-missing"),
                key: VariableName::new("temperature"),
            }])
            .await;
        assert!(snapshot.sensor_data.is_empty());
    }
}
