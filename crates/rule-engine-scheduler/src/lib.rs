// rule-engine-scheduler/src/lib.rs
// ============================================================================
// Module: Schedule Manager (C9)
// Description: Owns one cron-driven timer per schedule-enabled rule chain,
//              firing synthesized `scheduled` events onto C3 (spec §4.9).
// Purpose: Keep cron state entirely in-process, mirrored from and
//          write-through to the persistent store, so a restart rebuilds it
//          via `sync_from_store` rather than replaying missed ticks.
// Dependencies: rule-engine-core, rule-engine-store-sqlite, cron, chrono,
//               dashmap, tokio
// ============================================================================

//! ## Overview
//! Each enabled [`ScheduleRecord`] gets its own `tokio::task` computing its
//! next cron occurrence and sleeping until then (spec §5: "one
//! `tokio::time::sleep_until` loop per enabled schedule"), rather than a
//! single shared tick loop polling every chain — grounded on the per-rule
//! timer model `LokanOS`'s rule engine uses, generalized from its
//! interval-only trigger to a full cron expression.
//!
//! All mutation operations (`add_schedule`, `remove_schedule`, `enable`,
//! `disable`, `update`) write through to the store first, then adjust the
//! in-process handle, matching the contract's ordering. `sync_from_store`
//! diffs the store against the in-process table under a lock so ticks never
//! overlap (spec §4.9).
//!
//! Cron expressions are evaluated against UTC; the workspace carries no
//! IANA timezone database crate, so a schedule's `timezone` field is
//! persisted and surfaced for display but does not shift the computed fire
//! times (an Open Question resolution recorded in `DESIGN.md`).

mod error;

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use rule_engine_core::EventEnqueuer;
use rule_engine_core::EventType;
use rule_engine_core::RuleChainId;
use rule_engine_core::ScheduleRecord;
use rule_engine_core::ScheduleState;
use rule_engine_store_sqlite::SqliteStore;
use time::OffsetDateTime;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

pub use crate::error::SchedulerError;

fn validate_cron(expression: &str) -> Result<cron::Schedule, SchedulerError> {
    cron::Schedule::from_str(expression).map_err(|err| SchedulerError::InvalidCron {
        expression: expression.to_string(),
        reason: err.to_string(),
    })
}

struct ScheduleHandle {
    task: JoinHandle<()>,
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owns the in-process cron handles for every schedule-enabled rule chain
/// (spec §4.9).
pub struct ScheduleManager {
    store: Arc<SqliteStore>,
    enqueuer: Arc<dyn EventEnqueuer>,
    records: DashMap<RuleChainId, ScheduleRecord>,
    handles: DashMap<RuleChainId, ScheduleHandle>,
    sync_lock: AsyncMutex<()>,
}

impl ScheduleManager {
    /// Builds an empty manager. Call [`Self::sync_from_store`] to populate
    /// it from persisted schedule records.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, enqueuer: Arc<dyn EventEnqueuer>) -> Arc<Self> {
        Arc::new(Self {
            store,
            enqueuer,
            records: DashMap::new(),
            handles: DashMap::new(),
            sync_lock: AsyncMutex::new(()),
        })
    }

    async fn persist(&self, record: &ScheduleRecord) -> Result<(), SchedulerError> {
        let store = Arc::clone(&self.store);
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.upsert_schedule_record(&record))
            .await
            .map_err(|err| SchedulerError::Backend(err.to_string()))?
            .map_err(|err| SchedulerError::Backend(err.to_string()))
    }

    /// Registers a new schedule, persisting it before starting its handle
    /// if enabled.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidCron`] if the expression does not
    /// parse, or [`SchedulerError::Backend`] if the store write fails.
    pub async fn add_schedule(self: &Arc<Self>, record: ScheduleRecord) -> Result<(), SchedulerError> {
        validate_cron(&record.cron_expression)?;
        self.persist(&record).await?;
        let enabled = record.state == ScheduleState::Enabled;
        let rule_chain_id = record.rule_chain_id.clone();
        self.records.insert(rule_chain_id.clone(), record);
        if enabled {
            self.start_handle(rule_chain_id);
        }
        Ok(())
    }

    /// Removes a schedule: persists the deletion first, then stops and
    /// drops its handle.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Backend`] if the store delete fails.
    pub async fn remove_schedule(&self, rule_chain_id: &RuleChainId) -> Result<(), SchedulerError> {
        let store = Arc::clone(&self.store);
        let id = rule_chain_id.clone();
        tokio::task::spawn_blocking(move || store.delete_schedule_record(&id))
            .await
            .map_err(|err| SchedulerError::Backend(err.to_string()))?
            .map_err(|err| SchedulerError::Backend(err.to_string()))?;
        self.handles.remove(rule_chain_id);
        self.records.remove(rule_chain_id);
        Ok(())
    }

    /// Enables a previously disabled schedule, starting its handle.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] if no record exists, or
    /// [`SchedulerError::Backend`] if the store write fails.
    pub async fn enable(self: &Arc<Self>, rule_chain_id: &RuleChainId) -> Result<(), SchedulerError> {
        self.set_state(rule_chain_id, ScheduleState::Enabled).await?;
        self.start_handle(rule_chain_id.clone());
        Ok(())
    }

    /// Disables an enabled schedule, stopping and removing its handle.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] if no record exists, or
    /// [`SchedulerError::Backend`] if the store write fails.
    pub async fn disable(&self, rule_chain_id: &RuleChainId) -> Result<(), SchedulerError> {
        self.set_state(rule_chain_id, ScheduleState::Disabled).await?;
        self.handles.remove(rule_chain_id);
        Ok(())
    }

    async fn set_state(&self, rule_chain_id: &RuleChainId, state: ScheduleState) -> Result<(), SchedulerError> {
        let mut record = self
            .records
            .get(rule_chain_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| SchedulerError::NotFound(rule_chain_id.to_string()))?;
        record.state = state;
        self.persist(&record).await?;
        self.records.insert(rule_chain_id.clone(), record);
        Ok(())
    }

    /// Updates a schedule's definition: persists the new record, stops the
    /// old handle, then starts a new one with the updated expression if
    /// enabled (spec §4.9: "Update stops the old handle before starting a
    /// new one").
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidCron`] if the expression does not
    /// parse, or [`SchedulerError::Backend`] if the store write fails.
    pub async fn update(self: &Arc<Self>, record: ScheduleRecord) -> Result<(), SchedulerError> {
        validate_cron(&record.cron_expression)?;
        self.persist(&record).await?;
        let rule_chain_id = record.rule_chain_id.clone();
        self.handles.remove(&rule_chain_id);
        let enabled = record.state == ScheduleState::Enabled;
        self.records.insert(rule_chain_id.clone(), record);
        if enabled {
            self.start_handle(rule_chain_id);
        }
        Ok(())
    }

    /// Fires a schedule immediately, bypassing its cron timer entirely.
    /// Still updates fire accounting like a normal tick.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NotFound`] if no record exists for the
    /// given rule chain.
    pub async fn trigger_manually(&self, rule_chain_id: &RuleChainId) -> Result<(), SchedulerError> {
        let priority = self
            .records
            .get(rule_chain_id)
            .map(|entry| entry.priority)
            .ok_or_else(|| SchedulerError::NotFound(rule_chain_id.to_string()))?;
        self.fire(rule_chain_id, priority).await;
        Ok(())
    }

    /// Diffs the persistent store against the in-process table and applies
    /// adds, updates, and removals (spec §4.9 auto-sync). Serialized under
    /// a lock so overlapping ticks never run concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Backend`] if the store listing fails.
    pub async fn sync_from_store(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let _guard = self.sync_lock.lock().await;
        let store = Arc::clone(&self.store);
        let persisted = tokio::task::spawn_blocking(move || store.list_schedule_records())
            .await
            .map_err(|err| SchedulerError::Backend(err.to_string()))?
            .map_err(|err| SchedulerError::Backend(err.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for record in persisted {
            seen.insert(record.rule_chain_id.clone());
            let changed = self
                .records
                .get(&record.rule_chain_id)
                .is_none_or(|existing| *existing != record);
            if !changed {
                continue;
            }
            let rule_chain_id = record.rule_chain_id.clone();
            self.handles.remove(&rule_chain_id);
            let enabled = record.state == ScheduleState::Enabled;
            self.records.insert(rule_chain_id.clone(), record);
            if enabled {
                self.start_handle(rule_chain_id);
            }
        }

        let stale: Vec<RuleChainId> = self.records.iter().map(|entry| entry.key().clone()).filter(|id| !seen.contains(id)).collect();
        for rule_chain_id in stale {
            self.handles.remove(&rule_chain_id);
            self.records.remove(&rule_chain_id);
        }
        Ok(())
    }

    fn start_handle(self: &Arc<Self>, rule_chain_id: RuleChainId) {
        let manager = Arc::clone(self);
        let handle_key = rule_chain_id.clone();
        let task = tokio::spawn(async move {
            manager.timer_loop(rule_chain_id).await;
        });
        self.handles.insert(handle_key, ScheduleHandle {
            task,
        });
    }

    async fn timer_loop(self: Arc<Self>, rule_chain_id: RuleChainId) {
        loop {
            let Some((expression, priority)) = self.records.get(&rule_chain_id).map(|record| (record.cron_expression.clone(), record.priority)) else {
                return;
            };
            let schedule = match validate_cron(&expression) {
                Ok(schedule) => schedule,
                Err(err) => {
                    tracing::warn!(error = %err, rule_chain_id = %rule_chain_id, "schedule timer stopping: invalid cron expression");
                    return;
                }
            };
            let Some(next) = schedule.upcoming(chrono::Utc).next() else {
                tracing::warn!(rule_chain_id = %rule_chain_id, "cron schedule produced no upcoming occurrence");
                return;
            };
            let now = chrono::Utc::now();
            let wait = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(wait).await;

            let still_enabled = self.records.get(&rule_chain_id).is_some_and(|record| record.state == ScheduleState::Enabled);
            if !still_enabled {
                return;
            }
            self.fire(&rule_chain_id, priority).await;
        }
    }

    async fn fire(&self, rule_chain_id: &RuleChainId, priority: u8) {
        let payload = serde_json::json!({ "rule_chain_id": rule_chain_id.as_str() });
        if let Err(err) = self.enqueuer.emit(EventType::Scheduled, payload, Some(priority)).await {
            tracing::warn!(error = %err, rule_chain_id = %rule_chain_id, "schedule fire failed to enqueue event");
        }

        let now = OffsetDateTime::now_utc();
        if let Some(mut record) = self.records.get_mut(rule_chain_id) {
            record.record_fire(now);
        }

        let Some(record) = self.records.get(rule_chain_id).map(|entry| entry.clone()) else {
            return;
        };
        if self.persist(&record).await.is_err() {
            tracing::warn!(rule_chain_id = %rule_chain_id, "schedule fire accounting failed to persist, local counter still advanced");
            if let Some(mut record) = self.records.get_mut(rule_chain_id) {
                record.record_fire_persistence_failure();
            }
        }
    }
}

/// Avoids silently double-testing internal helpers the public API already
/// exercises (`validate_cron`, timer scheduling) while keeping a smoke test
/// over the pure pieces.
#[cfg(test)]
mod tests {
    use rule_engine_core::OrganizationId;

    use super::*;

    fn sample_record() -> ScheduleRecord {
        ScheduleRecord {
            rule_chain_id: RuleChainId::new("chain-1"),
            organization_id: OrganizationId::new("org-1"),
            cron_expression: "0 0 * * * *".to_string(),
            timezone: None,
            priority: 1,
            state: ScheduleState::Enabled,
            last_fire_at: None,
            execution_count: 0,
            failure_count: 0,
        }
    }

    #[test]
    fn rejects_invalid_cron_expression() {
        let err = validate_cron("not a cron expression");
        assert!(err.is_err());
    }

    #[test]
    fn accepts_six_field_cron_expression() {
        let record = sample_record();
        assert!(validate_cron(&record.cron_expression).is_ok());
    }
}
