// rule-engine-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Relational Store
// Description: Development/test-backend relational store for rule chains,
//              device state, telemetry, and schedule records (spec §6).
// Purpose: Persist the rows C1/C7/C8/C9/C10 read and write without a
//          running Postgres, with WAL durability for crash safety.
// Dependencies: rusqlite, serde_json, rule-engine-core
// ============================================================================

//! ## Overview
//! Grounded on `decision-gate-store-sqlite`'s WAL/pragma setup and
//! canonical-JSON-row pattern, scaled down: this store serializes each
//! domain row as one JSON column plus the handful of indexed columns C1's
//! rebuild query and C8's batch queries actually filter on, rather than a
//! normalized multi-table schema. The teacher serializes writes through a
//! dedicated writer thread to avoid `SQLITE_BUSY` under concurrent access;
//! this store instead serializes through a single `Mutex<Connection>`,
//! which is sufficient at this workspace's concurrency scale (see
//! `DESIGN.md`).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rule_engine_core::DeviceStateInstance;
use rule_engine_core::OrganizationId;
use rule_engine_core::OriginatorId;
use rule_engine_core::RuleChain;
use rule_engine_core::RuleChainId;
use rule_engine_core::ScheduleRecord;
use rule_engine_core::TelemetryData;
use rule_engine_core::VariableName;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use time::OffsetDateTime;

use crate::error::StoreError;

/// Default `SQLite` busy timeout, in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Current schema version, bumped in [`crate::migration_log::MigrationLog`].
const SCHEMA_VERSION: i64 = 1;

/// A `SQLite`-backed relational store (spec §6: "relational store").
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if necessary) a store at `path` and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] if the file cannot be opened, or
    /// [`StoreError::Query`] if migration fails.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|err| StoreError::Open(err.to_string()))?;
        Self::configure(&conn)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// Opens an in-memory store, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if initialization fails.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|err| StoreError::Open(err.to_string()))?;
        Self::configure(&conn)?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn configure(conn: &Connection) -> Result<(), StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rule_chains (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_rule_chains_org ON rule_chains(organization_id);

            CREATE TABLE IF NOT EXISTS device_state_instances (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                state_name TEXT NOT NULL,
                data TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dsi_lookup
                ON device_state_instances(device_id, state_name, recorded_at DESC);

            CREATE TABLE IF NOT EXISTS telemetry_data (
                id TEXT PRIMARY KEY,
                sensor_id TEXT NOT NULL,
                variable_name TEXT NOT NULL,
                data TEXT NOT NULL,
                received_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_td_lookup
                ON telemetry_data(sensor_id, variable_name, received_at DESC);

            CREATE TABLE IF NOT EXISTS schedule_records (
                rule_chain_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS migration_log (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            ",
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO migration_log (id, version) VALUES (1, ?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Inserts or replaces a rule chain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure or serialization failure.
    pub fn upsert_rule_chain(&self, chain: &RuleChain) -> Result<(), StoreError> {
        let data = serde_json::to_string(chain).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO rule_chains (id, organization_id, data, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET organization_id = excluded.organization_id,
                data = excluded.data, updated_at = excluded.updated_at",
            params![chain.id.as_str(), chain.organization_id.as_str(), data, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Fetches one rule chain by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure or a corrupt stored row.
    pub fn get_rule_chain(&self, id: &RuleChainId) -> Result<Option<RuleChain>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let data: Option<String> = conn
            .query_row("SELECT data FROM rule_chains WHERE id = ?1", params![id.as_str()], |row| row.get(0))
            .optional()?;
        data.map(|json| serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string())))
            .transpose()
    }

    /// Lists every rule chain owned by `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn list_rule_chains_for_organization(&self, organization_id: &OrganizationId) -> Result<Vec<RuleChain>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT data FROM rule_chains WHERE organization_id = ?1")?;
        let rows = stmt.query_map(params![organization_id.as_str()], |row| row.get::<_, String>(0))?;
        let mut chains = Vec::new();
        for row in rows {
            let json = row?;
            chains.push(serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))?);
        }
        Ok(chains)
    }

    /// Lists every rule chain across every organization, used to preload
    /// C5's execution-type index at startup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn list_all_rule_chains(&self) -> Result<Vec<RuleChain>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT data FROM rule_chains")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut chains = Vec::new();
        for row in rows {
            let json = row?;
            chains.push(serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))?);
        }
        Ok(chains)
    }

    /// C1's rebuild query: every rule chain whose filter leaves reference
    /// `originator_id` on any of `variable_names` (spec §4.1).
    ///
    /// This loads and filters in-process rather than via a normalized join,
    /// an intentional simplification given this workspace's data scale (see
    /// `DESIGN.md`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn rule_chains_referencing(&self, originator_id: &OriginatorId, variable_names: &[VariableName]) -> Result<Vec<RuleChainId>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT id, data FROM rule_chains")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut matches = Vec::new();
        for row in rows {
            let (id, json) = row?;
            let chain: RuleChain = serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))?;
            if chain_references(&chain, originator_id, variable_names) {
                matches.push(RuleChainId::new(id));
            }
        }
        Ok(matches)
    }

    /// Removes a rule chain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn delete_rule_chain(&self, id: &RuleChainId) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute("DELETE FROM rule_chains WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }

    /// Records one device-state instance (spec §4.10, `[SUPPLEMENT]`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn insert_device_state_instance(&self, instance: &DeviceStateInstance) -> Result<(), StoreError> {
        let data = serde_json::to_string(instance).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO device_state_instances (id, device_id, state_name, data, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                instance.id.as_str(),
                instance.device_id.as_str(),
                instance.state_name.as_str(),
                data,
                instance.recorded_at.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
            ],
        )?;
        Ok(())
    }

    /// Returns the most recently recorded state instance for
    /// `(device_id, state_name)`, the latest-value source C8 reads for
    /// `device` originators.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn latest_device_state(&self, device_id: &OriginatorId, state_name: &str) -> Result<Option<DeviceStateInstance>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM device_state_instances
                 WHERE device_id = ?1 AND state_name = ?2
                 ORDER BY recorded_at DESC LIMIT 1",
                params![device_id.as_str(), state_name],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|json| serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string())))
            .transpose()
    }

    /// Returns the most recent state instance for each requested
    /// `(device_id, state_name)` pair in a single round trip, the one
    /// batch-query-per-`sourceType` read path C8 issues for its cache
    /// misses instead of querying row by row (spec §4.8, §9).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn latest_device_states_batch(&self, keys: &[(OriginatorId, VariableName)]) -> Result<HashMap<(OriginatorId, VariableName), DeviceStateInstance>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let placeholders = keys.iter().map(|_| "(?, ?)").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT device_id, state_name, data FROM (
                 SELECT device_id, state_name, data,
                        ROW_NUMBER() OVER (PARTITION BY device_id, state_name ORDER BY recorded_at DESC) AS rn
                 FROM device_state_instances
                 WHERE (device_id, state_name) IN (VALUES {placeholders})
             ) WHERE rn = 1"
        );
        let mut flat: Vec<&str> = Vec::with_capacity(keys.len() * 2);
        for (device_id, state_name) in keys {
            flat.push(device_id.as_str());
            flat.push(state_name.as_str());
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(flat.iter()), |row| {
            let device_id: String = row.get(0)?;
            let state_name: String = row.get(1)?;
            let data: String = row.get(2)?;
            Ok((device_id, state_name, data))
        })?;
        let mut out = HashMap::with_capacity(keys.len());
        for row in rows {
            let (device_id, state_name, data) = row?;
            let instance: DeviceStateInstance = serde_json::from_str(&data).map_err(|err| StoreError::Corrupt(err.to_string()))?;
            out.insert((OriginatorId::new(device_id), VariableName::new(state_name)), instance);
        }
        Ok(out)
    }

    /// Records one telemetry reading (spec §4.8, `[SUPPLEMENT]`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn insert_telemetry_data(&self, data_point: &TelemetryData) -> Result<(), StoreError> {
        let data = serde_json::to_string(data_point).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO telemetry_data (id, sensor_id, variable_name, data, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                data_point.id.as_str(),
                data_point.sensor_id.as_str(),
                data_point.variable_name.as_str(),
                data,
                data_point.received_at.format(&time::format_description::well_known::Rfc3339).unwrap_or_default(),
            ],
        )?;
        Ok(())
    }

    /// Returns the most recent telemetry reading for
    /// `(sensor_id, variable_name)`, the latest-value source C8 reads for
    /// `sensor` originators.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn latest_telemetry(&self, sensor_id: &OriginatorId, variable_name: &VariableName) -> Result<Option<TelemetryData>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM telemetry_data
                 WHERE sensor_id = ?1 AND variable_name = ?2
                 ORDER BY received_at DESC LIMIT 1",
                params![sensor_id.as_str(), variable_name.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|json| serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string())))
            .transpose()
    }

    /// Returns the most recent telemetry reading for each requested
    /// `(sensor_id, variable_name)` pair in a single round trip, the sensor
    /// half of C8's batch-query-per-`sourceType` read path (spec §4.8, §9).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn latest_telemetry_batch(&self, keys: &[(OriginatorId, VariableName)]) -> Result<HashMap<(OriginatorId, VariableName), TelemetryData>, StoreError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let placeholders = keys.iter().map(|_| "(?, ?)").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT sensor_id, variable_name, data FROM (
                 SELECT sensor_id, variable_name, data,
                        ROW_NUMBER() OVER (PARTITION BY sensor_id, variable_name ORDER BY received_at DESC) AS rn
                 FROM telemetry_data
                 WHERE (sensor_id, variable_name) IN (VALUES {placeholders})
             ) WHERE rn = 1"
        );
        let mut flat: Vec<&str> = Vec::with_capacity(keys.len() * 2);
        for (sensor_id, variable_name) in keys {
            flat.push(sensor_id.as_str());
            flat.push(variable_name.as_str());
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(flat.iter()), |row| {
            let sensor_id: String = row.get(0)?;
            let variable_name: String = row.get(1)?;
            let data: String = row.get(2)?;
            Ok((sensor_id, variable_name, data))
        })?;
        let mut out = HashMap::with_capacity(keys.len());
        for row in rows {
            let (sensor_id, variable_name, data) = row?;
            let reading: TelemetryData = serde_json::from_str(&data).map_err(|err| StoreError::Corrupt(err.to_string()))?;
            out.insert((OriginatorId::new(sensor_id), VariableName::new(variable_name)), reading);
        }
        Ok(out)
    }

    /// Inserts or replaces a schedule record (spec §4.9).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn upsert_schedule_record(&self, record: &ScheduleRecord) -> Result<(), StoreError> {
        let data = serde_json::to_string(record).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO schedule_records (rule_chain_id, data, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(rule_chain_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![record.rule_chain_id.as_str(), data, now_rfc3339()],
        )?;
        Ok(())
    }

    /// Lists every persisted schedule record, the source C9's auto-sync
    /// reconciles against (spec §4.9, §8 invariant 8).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn list_schedule_records(&self) -> Result<Vec<ScheduleRecord>, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn.prepare("SELECT data FROM schedule_records")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for row in rows {
            let json = row?;
            records.push(serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))?);
        }
        Ok(records)
    }

    /// Removes a schedule record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn delete_schedule_record(&self, rule_chain_id: &RuleChainId) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute("DELETE FROM schedule_records WHERE rule_chain_id = ?1", params![rule_chain_id.as_str()])?;
        Ok(())
    }

    /// Returns the current `MigrationLog` version (spec §2 `[SUPPLEMENT]`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn migration_log_version(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let version: i64 = conn.query_row("SELECT version FROM migration_log WHERE id = 1", [], |row| row.get(0))?;
        Ok(version)
    }

    /// Advances the `MigrationLog` version, signaling C1 to force-invalidate
    /// its cache regardless of TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub fn bump_migration_log(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute("UPDATE migration_log SET version = version + 1 WHERE id = 1", [])?;
        let version: i64 = conn.query_row("SELECT version FROM migration_log WHERE id = 1", [], |row| row.get(0))?;
        Ok(version)
    }
}

fn chain_references(chain: &RuleChain, originator_id: &OriginatorId, variable_names: &[VariableName]) -> bool {
    chain.nodes.iter().any(|node| leaf_matches(&node.config, originator_id, variable_names))
}

fn leaf_matches(config: &rule_engine_core::NodeConfig, originator_id: &OriginatorId, variable_names: &[VariableName]) -> bool {
    let rule_engine_core::NodeConfig::Filter { requirement } = config else {
        return false;
    };
    requirement_matches(requirement, originator_id, variable_names)
}

fn requirement_matches(
    requirement: &rule_logic::Requirement<rule_engine_core::FilterLeaf>,
    originator_id: &OriginatorId,
    variable_names: &[VariableName],
) -> bool {
    use rule_logic::Requirement;
    match requirement {
        Requirement::Predicate(leaf) => leaf.uuid == *originator_id && variable_names.contains(&leaf.key),
        Requirement::Not(inner) => requirement_matches(inner, originator_id, variable_names),
        Requirement::And(reqs) | Requirement::Or(reqs) => reqs.iter().any(|req| requirement_matches(req, originator_id, variable_names)),
        Requirement::RequireGroup { reqs, .. } => reqs.iter().any(|req| requirement_matches(req, originator_id, variable_names)),
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use rule_engine_core::DeviceStateInstanceId;
    use rule_engine_core::ExecutionType;
    use rule_engine_core::InitiatedBy;
    use rule_engine_core::RuleChainNode;
    use rule_engine_core::RuleChainNodeId;
    use rule_engine_core::TelemetryDataId;
    use rule_logic::Requirement;

    use super::*;

    fn sample_chain_referencing(originator_id: &OriginatorId, variable: &VariableName) -> RuleChain {
        let leaf = rule_engine_core::FilterLeaf {
            source_type: rule_engine_core::OriginatorType::Sensor,
            uuid: originator_id.clone(),
            key: variable.clone(),
            op: rule_engine_core::Comparator::Gt,
            value: rule_engine_core::SnapshotValue::Number(10.0),
        };
        RuleChain {
            id: RuleChainId::new("chain-1"),
            organization_id: OrganizationId::new("org-1"),
            name: "test".into(),
            execution_type: ExecutionType::EventTriggered,
            schedule_enabled: false,
            cron_expression: None,
            timezone: None,
            priority: 5,
            max_retries: 3,
            retry_delay_ms: 500,
            nodes: vec![RuleChainNode {
                id: RuleChainNodeId::new("n1"),
                rule_chain_id: RuleChainId::new("chain-1"),
                config: rule_engine_core::NodeConfig::Filter { requirement: Requirement::predicate(leaf) },
                next_node_id: None,
            }],
            entry_node_id: Some(RuleChainNodeId::new("n1")),
            last_executed_at: None,
            execution_count: 0,
            failure_count: 0,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let originator = OriginatorId::new("sensor-1");
        let variable = VariableName::new("temperature");
        let chain = sample_chain_referencing(&originator, &variable);
        store.upsert_rule_chain(&chain).unwrap();
        let fetched = store.get_rule_chain(&chain.id).unwrap().unwrap();
        assert_eq!(fetched.id, chain.id);
    }

    #[test]
    fn rule_chains_referencing_finds_matching_filter_leaf() {
        let store = SqliteStore::open_in_memory().unwrap();
        let originator = OriginatorId::new("sensor-1");
        let variable = VariableName::new("temperature");
        let chain = sample_chain_referencing(&originator, &variable);
        store.upsert_rule_chain(&chain).unwrap();

        let matches = store.rule_chains_referencing(&originator, std::slice::from_ref(&variable)).unwrap();
        assert_eq!(matches, vec![chain.id]);

        let no_matches = store
            .rule_chains_referencing(&OriginatorId::new("other"), std::slice::from_ref(&variable))
            .unwrap();
        assert!(no_matches.is_empty());
    }

    #[test]
    fn list_all_rule_chains_spans_organizations() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut chain_a = sample_chain_referencing(&OriginatorId::new("sensor-1"), &VariableName::new("temperature"));
        chain_a.organization_id = OrganizationId::new("org-a");
        let mut chain_b = sample_chain_referencing(&OriginatorId::new("sensor-2"), &VariableName::new("humidity"));
        chain_b.id = RuleChainId::new("chain-2");
        chain_b.organization_id = OrganizationId::new("org-b");
        store.upsert_rule_chain(&chain_a).unwrap();
        store.upsert_rule_chain(&chain_b).unwrap();

        let mut all = store.list_all_rule_chains().unwrap();
        all.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, chain_a.id);
        assert_eq!(all[1].id, chain_b.id);
    }

    #[test]
    fn device_state_latest_value_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let instance = DeviceStateInstance {
            id: DeviceStateInstanceId::new("dsi-1"),
            device_id: OriginatorId::new("device-1"),
            state_name: "power".into(),
            value: serde_json::json!(true),
            initiated_by: InitiatedBy::External,
            metadata: serde_json::json!({}),
            recorded_at: OffsetDateTime::now_utc(),
        };
        store.insert_device_state_instance(&instance).unwrap();
        let latest = store.latest_device_state(&instance.device_id, "power").unwrap().unwrap();
        assert_eq!(latest.id, instance.id);
    }

    #[test]
    fn telemetry_latest_value_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let data = TelemetryData {
            id: TelemetryDataId::new("td-1"),
            sensor_id: OriginatorId::new("sensor-1"),
            variable_name: VariableName::new("temperature"),
            value: "21.5".into(),
            datatype: "double".into(),
            received_at: OffsetDateTime::now_utc(),
        };
        store.insert_telemetry_data(&data).unwrap();
        let latest = store.latest_telemetry(&data.sensor_id, &data.variable_name).unwrap().unwrap();
        assert_eq!(latest.id, data.id);
    }

    #[test]
    fn device_state_batch_resolves_latest_per_key_in_one_call() {
        let store = SqliteStore::open_in_memory().unwrap();
        let device_a = OriginatorId::new("device-a");
        let power = VariableName::new("power");
        store
            .insert_device_state_instance(&DeviceStateInstance {
                id: DeviceStateInstanceId::new("dsi-1"),
                device_id: device_a.clone(),
                state_name: power.clone(),
                value: serde_json::json!(false),
                initiated_by: InitiatedBy::External,
                metadata: serde_json::json!({}),
                recorded_at: OffsetDateTime::now_utc() - time::Duration::seconds(10),
            })
            .unwrap();
        store
            .insert_device_state_instance(&DeviceStateInstance {
                id: DeviceStateInstanceId::new("dsi-2"),
                device_id: device_a.clone(),
                state_name: power.clone(),
                value: serde_json::json!(true),
                initiated_by: InitiatedBy::External,
                metadata: serde_json::json!({}),
                recorded_at: OffsetDateTime::now_utc(),
            })
            .unwrap();

        let results = store.latest_device_states_batch(&[(device_a.clone(), power.clone())]).unwrap();
        let latest = results.get(&(device_a, power)).unwrap();
        assert_eq!(latest.id, DeviceStateInstanceId::new("dsi-2"));
    }

    #[test]
    fn telemetry_batch_resolves_latest_per_key_in_one_call() {
        let store = SqliteStore::open_in_memory().unwrap();
        let sensor_a = OriginatorId::new("sensor-a");
        let sensor_b = OriginatorId::new("sensor-b");
        let temperature = VariableName::new("temperature");
        store
            .insert_telemetry_data(&TelemetryData {
                id: TelemetryDataId::new("td-a"),
                sensor_id: sensor_a.clone(),
                variable_name: temperature.clone(),
                value: "20.0".into(),
                datatype: "double".into(),
                received_at: OffsetDateTime::now_utc(),
            })
            .unwrap();
        store
            .insert_telemetry_data(&TelemetryData {
                id: TelemetryDataId::new("td-b"),
                sensor_id: sensor_b.clone(),
                variable_name: temperature.clone(),
                value: "30.0".into(),
                datatype: "double".into(),
                received_at: OffsetDateTime::now_utc(),
            })
            .unwrap();

        let results = store
            .latest_telemetry_batch(&[(sensor_a.clone(), temperature.clone()), (sensor_b.clone(), temperature.clone())])
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results.get(&(sensor_a, temperature.clone())).unwrap().id, TelemetryDataId::new("td-a"));
        assert_eq!(results.get(&(sensor_b, temperature)).unwrap().id, TelemetryDataId::new("td-b"));
    }

    #[test]
    fn migration_log_bump_is_monotonic() {
        let store = SqliteStore::open_in_memory().unwrap();
        let initial = store.migration_log_version().unwrap();
        assert_eq!(store.bump_migration_log().unwrap(), initial + 1);
        assert_eq!(store.bump_migration_log().unwrap(), initial + 2);
    }
}
