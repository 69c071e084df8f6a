// rule-engine-store-postgres/src/store.rs
// ============================================================================
// Module: Postgres Relational Store
// Description: Production relational store for rule chains, device state,
//              telemetry, and schedule records (spec §6).
// Purpose: The durable backend `rule-engine-cli` wires up outside local
//          development and the test suite.
// Dependencies: sqlx (postgres, runtime-tokio-rustls), serde_json,
//               rule-engine-core
// ============================================================================

//! ## Overview
//! Same table shapes and canonical-JSON-row pattern as
//! `rule-engine-store-sqlite` — one JSON column per domain row plus the
//! handful of indexed columns C1's rebuild query and C8's batch queries
//! filter on — ported to `sqlx`'s async `PgPool` rather than a
//! `Mutex<Connection>`, since Postgres is the concurrent, multi-process
//! production backend (spec §6).
//!
//! **Deviation from the teacher**: `decision-gate-store-sqlite` and the
//! teacher's own Postgres backend both implement a shared synchronous
//! `RunStateStore` trait so the binary can pick either at startup behind
//! one interface. This crate does not implement a shared trait with
//! [`rule_engine_store_sqlite::SqliteStore`]: that store is synchronous
//! (`rusqlite`) and already bridged into async call sites with
//! `tokio::task::spawn_blocking` at each call site, while this store is
//! natively async (`sqlx`). Unifying them would mean forcing one of the two
//! drivers against its grain; this is recorded here rather than done
//! silently (see `DESIGN.md`).

use rule_engine_core::DeviceStateInstance;
use rule_engine_core::OrganizationId;
use rule_engine_core::OriginatorId;
use rule_engine_core::RuleChain;
use rule_engine_core::RuleChainId;
use rule_engine_core::ScheduleRecord;
use rule_engine_core::TelemetryData;
use rule_engine_core::VariableName;
use sqlx::PgPool;
use sqlx::Row;
use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;

use crate::error::StoreError;

/// Current schema version, bumped alongside the migration applied in
/// [`PostgresStore::migrate`].
const SCHEMA_VERSION: i64 = 1;

/// A Postgres-backed relational store (spec §6: "relational store").
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects to `database_url` with a pool of at most `max_connections`
    /// and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connect`] if the pool cannot be established, or
    /// [`StoreError::Query`] if migration fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|err| StoreError::Connect(err.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Wraps an already-constructed pool, useful for tests against a
    /// container-backed Postgres.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if migration fails.
    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rule_chains (
                id TEXT PRIMARY KEY,
                organization_id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rule_chains_org ON rule_chains(organization_id)").execute(&self.pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS device_state_instances (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                state_name TEXT NOT NULL,
                data TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_dsi_lookup ON device_state_instances(device_id, state_name, recorded_at DESC)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS telemetry_data (
                id TEXT PRIMARY KEY,
                sensor_id TEXT NOT NULL,
                variable_name TEXT NOT NULL,
                data TEXT NOT NULL,
                received_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_td_lookup ON telemetry_data(sensor_id, variable_name, received_at DESC)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schedule_records (
                rule_chain_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS migration_log (
                id INTEGER PRIMARY KEY,
                version BIGINT NOT NULL,
                CHECK (id = 1)
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("INSERT INTO migration_log (id, version) VALUES (1, $1) ON CONFLICT (id) DO NOTHING")
            .bind(SCHEMA_VERSION)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts or replaces a rule chain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure or serialization failure.
    pub async fn upsert_rule_chain(&self, chain: &RuleChain) -> Result<(), StoreError> {
        let data = serde_json::to_string(chain).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        sqlx::query(
            "INSERT INTO rule_chains (id, organization_id, data, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE SET organization_id = excluded.organization_id,
                data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(chain.id.as_str())
        .bind(chain.organization_id.as_str())
        .bind(data)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetches one rule chain by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure or a corrupt stored row.
    pub async fn get_rule_chain(&self, id: &RuleChainId) -> Result<Option<RuleChain>, StoreError> {
        let row = sqlx::query("SELECT data FROM rule_chains WHERE id = $1").bind(id.as_str()).fetch_optional(&self.pool).await?;
        row.map(|row| {
            let json: String = row.try_get("data")?;
            serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))
        })
        .transpose()
    }

    /// Lists every rule chain owned by `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn list_rule_chains_for_organization(&self, organization_id: &OrganizationId) -> Result<Vec<RuleChain>, StoreError> {
        let rows = sqlx::query("SELECT data FROM rule_chains WHERE organization_id = $1").bind(organization_id.as_str()).fetch_all(&self.pool).await?;
        let mut chains = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.try_get("data")?;
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
    pub async fn list_all_rule_chains(&self) -> Result<Vec<RuleChain>, StoreError> {
        let rows = sqlx::query("SELECT data FROM rule_chains").fetch_all(&self.pool).await?;
        let mut chains = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.try_get("data")?;
            chains.push(serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))?);
        }
        Ok(chains)
    }

    /// C1's rebuild query: every rule chain whose filter leaves reference
    /// `originator_id` on any of `variable_names` (spec §4.1).
    ///
    /// Loads and filters in-process rather than via a normalized join, the
    /// same intentional simplification as the `SQLite` store (see
    /// `DESIGN.md`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn rule_chains_referencing(&self, originator_id: &OriginatorId, variable_names: &[VariableName]) -> Result<Vec<RuleChainId>, StoreError> {
        let rows = sqlx::query("SELECT id, data FROM rule_chains").fetch_all(&self.pool).await?;
        let mut matches = Vec::new();
        for row in rows {
            let id: String = row.try_get("id")?;
            let json: String = row.try_get("data")?;
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
    pub async fn delete_rule_chain(&self, id: &RuleChainId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM rule_chains WHERE id = $1").bind(id.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    /// Records one device-state instance (spec §4.10, `[SUPPLEMENT]`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn insert_device_state_instance(&self, instance: &DeviceStateInstance) -> Result<(), StoreError> {
        let data = serde_json::to_string(instance).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        sqlx::query(
            "INSERT INTO device_state_instances (id, device_id, state_name, data, recorded_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(instance.id.as_str())
        .bind(instance.device_id.as_str())
        .bind(instance.state_name.as_str())
        .bind(data)
        .bind(instance.recorded_at.format(&time::format_description::well_known::Rfc3339).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the most recently recorded state instance for
    /// `(device_id, state_name)`, the latest-value source C8 reads for
    /// `device` originators.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn latest_device_state(&self, device_id: &OriginatorId, state_name: &str) -> Result<Option<DeviceStateInstance>, StoreError> {
        let row = sqlx::query(
            "SELECT data FROM device_state_instances
             WHERE device_id = $1 AND state_name = $2
             ORDER BY recorded_at DESC LIMIT 1",
        )
        .bind(device_id.as_str())
        .bind(state_name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let json: String = row.try_get("data")?;
            serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))
        })
        .transpose()
    }

    /// Records one telemetry reading (spec §4.8, `[SUPPLEMENT]`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn insert_telemetry_data(&self, data_point: &TelemetryData) -> Result<(), StoreError> {
        let data = serde_json::to_string(data_point).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        sqlx::query(
            "INSERT INTO telemetry_data (id, sensor_id, variable_name, data, received_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(data_point.id.as_str())
        .bind(data_point.sensor_id.as_str())
        .bind(data_point.variable_name.as_str())
        .bind(data)
        .bind(data_point.received_at.format(&time::format_description::well_known::Rfc3339).unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the most recent telemetry reading for
    /// `(sensor_id, variable_name)`, the latest-value source C8 reads for
    /// `sensor` originators.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn latest_telemetry(&self, sensor_id: &OriginatorId, variable_name: &VariableName) -> Result<Option<TelemetryData>, StoreError> {
        let row = sqlx::query(
            "SELECT data FROM telemetry_data
             WHERE sensor_id = $1 AND variable_name = $2
             ORDER BY received_at DESC LIMIT 1",
        )
        .bind(sensor_id.as_str())
        .bind(variable_name.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let json: String = row.try_get("data")?;
            serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))
        })
        .transpose()
    }

    /// Inserts or replaces a schedule record (spec §4.9).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn upsert_schedule_record(&self, record: &ScheduleRecord) -> Result<(), StoreError> {
        let data = serde_json::to_string(record).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        sqlx::query(
            "INSERT INTO schedule_records (rule_chain_id, data, updated_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (rule_chain_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(record.rule_chain_id.as_str())
        .bind(data)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Lists every persisted schedule record, the source C9's auto-sync
    /// reconciles against (spec §4.9, §8 invariant 8).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn list_schedule_records(&self) -> Result<Vec<ScheduleRecord>, StoreError> {
        let rows = sqlx::query("SELECT data FROM schedule_records").fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.try_get("data")?;
            records.push(serde_json::from_str(&json).map_err(|err| StoreError::Corrupt(err.to_string()))?);
        }
        Ok(records)
    }

    /// Removes a schedule record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn delete_schedule_record(&self, rule_chain_id: &RuleChainId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM schedule_records WHERE rule_chain_id = $1").bind(rule_chain_id.as_str()).execute(&self.pool).await?;
        Ok(())
    }

    /// Returns the current `MigrationLog` version (spec §2 `[SUPPLEMENT]`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn migration_log_version(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT version FROM migration_log WHERE id = 1").fetch_one(&self.pool).await?;
        Ok(row.try_get("version")?)
    }

    /// Advances the `MigrationLog` version, signaling C1 to force-invalidate
    /// its cache regardless of TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on a query failure.
    pub async fn bump_migration_log(&self) -> Result<i64, StoreError> {
        sqlx::query("UPDATE migration_log SET version = version + 1 WHERE id = 1").execute(&self.pool).await?;
        let row = sqlx::query("SELECT version FROM migration_log WHERE id = 1").fetch_one(&self.pool).await?;
        Ok(row.try_get("version")?)
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
    OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use rule_engine_core::Comparator;
    use rule_engine_core::DeviceStateInstanceId;
    use rule_engine_core::ExecutionType;
    use rule_engine_core::FilterLeaf;
    use rule_engine_core::InitiatedBy;
    use rule_engine_core::NodeConfig;
    use rule_engine_core::OriginatorType;
    use rule_engine_core::RuleChainNode;
    use rule_engine_core::RuleChainNodeId;
    use rule_engine_core::SnapshotValue;
    use rule_engine_core::TelemetryDataId;
    use rule_logic::Requirement;

    use super::*;

    fn sample_chain_referencing(originator_id: &OriginatorId, variable: &VariableName) -> RuleChain {
        let leaf = FilterLeaf {
            source_type: OriginatorType::Sensor,
            uuid: originator_id.clone(),
            key: variable.clone(),
            op: Comparator::Gt,
            value: SnapshotValue::Number(10.0),
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
                config: NodeConfig::Filter { requirement: Requirement::predicate(leaf) },
                next_node_id: None,
            }],
            entry_node_id: Some(RuleChainNodeId::new("n1")),
            last_executed_at: None,
            execution_count: 0,
            failure_count: 0,
        }
    }

    // These tests require a reachable Postgres instance named by
    // `TEST_DATABASE_URL` and are skipped (not ignored) when it is unset, so
    // the crate's default test run never depends on external services.

    async fn connect_for_test() -> Option<PostgresStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        Some(PostgresStore::connect(&url, 5).await.expect("connect"))
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let Some(store) = connect_for_test().await else { return };
        let originator = OriginatorId::new("sensor-1");
        let variable = VariableName::new("temperature");
        let chain = sample_chain_referencing(&originator, &variable);
        store.upsert_rule_chain(&chain).await.expect("upsert");
        let fetched = store.get_rule_chain(&chain.id).await.expect("get").expect("present");
        assert_eq!(fetched.id, chain.id);
        store.delete_rule_chain(&chain.id).await.expect("cleanup");
    }

    #[tokio::test]
    async fn list_all_rule_chains_spans_organizations() {
        let Some(store) = connect_for_test().await else { return };
        let mut chain_a = sample_chain_referencing(&OriginatorId::new("sensor-pg-list-a"), &VariableName::new("temperature"));
        chain_a.id = RuleChainId::new("chain-pg-list-a");
        chain_a.organization_id = OrganizationId::new("org-pg-a");
        let mut chain_b = sample_chain_referencing(&OriginatorId::new("sensor-pg-list-b"), &VariableName::new("humidity"));
        chain_b.id = RuleChainId::new("chain-pg-list-b");
        chain_b.organization_id = OrganizationId::new("org-pg-b");
        store.upsert_rule_chain(&chain_a).await.expect("upsert a");
        store.upsert_rule_chain(&chain_b).await.expect("upsert b");

        let all = store.list_all_rule_chains().await.expect("list");
        assert!(all.iter().any(|chain| chain.id == chain_a.id));
        assert!(all.iter().any(|chain| chain.id == chain_b.id));

        store.delete_rule_chain(&chain_a.id).await.expect("cleanup a");
        store.delete_rule_chain(&chain_b.id).await.expect("cleanup b");
    }

    #[tokio::test]
    async fn rule_chains_referencing_finds_matching_filter_leaf() {
        let Some(store) = connect_for_test().await else { return };
        let originator = OriginatorId::new("sensor-pg-1");
        let variable = VariableName::new("temperature");
        let chain = sample_chain_referencing(&originator, &variable);
        store.upsert_rule_chain(&chain).await.expect("upsert");

        let matches = store.rule_chains_referencing(&originator, std::slice::from_ref(&variable)).await.expect("query");
        assert!(matches.contains(&chain.id));
        store.delete_rule_chain(&chain.id).await.expect("cleanup");
    }

    #[tokio::test]
    async fn device_state_latest_value_round_trips() {
        let Some(store) = connect_for_test().await else { return };
        let instance = DeviceStateInstance {
            id: DeviceStateInstanceId::new("dsi-pg-1"),
            device_id: OriginatorId::new("device-pg-1"),
            state_name: "power".into(),
            value: serde_json::json!(true),
            initiated_by: InitiatedBy::External,
            metadata: serde_json::json!({}),
            recorded_at: OffsetDateTime::now_utc(),
        };
        store.insert_device_state_instance(&instance).await.expect("insert");
        let latest = store.latest_device_state(&instance.device_id, "power").await.expect("get").expect("present");
        assert_eq!(latest.id, instance.id);
    }

    #[tokio::test]
    async fn telemetry_latest_value_round_trips() {
        let Some(store) = connect_for_test().await else { return };
        let data = TelemetryData {
            id: TelemetryDataId::new("td-pg-1"),
            sensor_id: OriginatorId::new("sensor-pg-2"),
            variable_name: VariableName::new("temperature"),
            value: "21.5".into(),
            datatype: "double".into(),
            received_at: OffsetDateTime::now_utc(),
        };
        store.insert_telemetry_data(&data).await.expect("insert");
        let latest = store.latest_telemetry(&data.sensor_id, &data.variable_name).await.expect("get").expect("present");
        assert_eq!(latest.id, data.id);
    }

    #[tokio::test]
    async fn migration_log_bump_is_monotonic() {
        let Some(store) = connect_for_test().await else { return };
        let initial = store.migration_log_version().await.expect("version");
        assert_eq!(store.bump_migration_log().await.expect("bump"), initial + 1);
        assert_eq!(store.bump_migration_log().await.expect("bump"), initial + 2);
    }
}
