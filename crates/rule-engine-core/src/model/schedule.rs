// rule-engine-core/src/model/schedule.rs
// ============================================================================
// Module: Schedule Record
// Description: In-process mirror of a schedule-enabled rule chain (spec §3,
//              §4.9).
// Purpose: Track cron handle state and fire accounting for C9.
// Dependencies: serde, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::model::ids::OrganizationId;
use crate::model::ids::RuleChainId;

/// A schedule's in-process enabled/disabled state (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleState {
    /// No cron handle exists for this schedule.
    Disabled,
    /// A cron handle is running.
    Enabled,
}

/// Mirrors the persistent schedule fields plus derived runtime state
/// (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    /// The rule chain this schedule fires.
    pub rule_chain_id: RuleChainId,
    /// The owning organization.
    pub organization_id: OrganizationId,
    /// The cron expression driving this schedule.
    pub cron_expression: String,
    /// IANA timezone the cron expression is interpreted in.
    pub timezone: Option<String>,
    /// Priority assigned to fired events; spec default is 1.
    pub priority: u8,
    /// Current enabled/disabled state.
    pub state: ScheduleState,
    /// Timestamp of the last fire, if any.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_fire_at: Option<OffsetDateTime>,
    /// Number of times this schedule has fired.
    pub execution_count: u64,
    /// Number of fires whose persistence update failed.
    pub failure_count: u64,
}

impl ScheduleRecord {
    /// Records a fire, advancing the local counter unconditionally even if
    /// the caller's persistence write later fails (spec §4.9 failure
    /// accounting: "on persistence failure the local counter still
    /// advances").
    pub fn record_fire(&mut self, at: OffsetDateTime) {
        self.last_fire_at = Some(at);
        self.execution_count += 1;
    }

    /// Records a fire whose persistence write failed.
    pub fn record_fire_persistence_failure(&mut self) {
        self.failure_count += 1;
    }
}
