// rule-engine-core/src/model/rule_chain.rs
// ============================================================================
// Module: Rule Chain Configuration
// Description: Persistent rule-chain and rule-chain-node configuration
//              (spec §3, §4.7).
// Purpose: Typed representation of the DAG a rule-chain executor walks.
// Dependencies: rule-logic, serde, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::model::ids::OrganizationId;
use crate::model::ids::OriginatorId;
use crate::model::ids::RuleChainId;
use crate::model::ids::RuleChainNodeId;
use crate::model::ids::VariableName;
use crate::model::snapshot::Snapshot;
use crate::model::snapshot::SnapshotValue;
use rule_logic::Predicate;
use rule_logic::Requirement;

/// When a rule chain is eligible to execute (spec §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionType {
    /// Runs only in response to matching events.
    EventTriggered,
    /// Runs only from the schedule manager (spec §4.9).
    ScheduleOnly,
    /// Runs from both events and schedule ticks.
    Hybrid,
}

impl ExecutionType {
    /// Returns true when an event-triggered invocation may run this type.
    #[must_use]
    pub const fn allows_event(self) -> bool {
        matches!(self, Self::EventTriggered | Self::Hybrid)
    }

    /// Returns true when a schedule-triggered invocation may run this type.
    #[must_use]
    pub const fn allows_schedule(self) -> bool {
        matches!(self, Self::ScheduleOnly | Self::Hybrid)
    }
}

/// A persisted rule chain (spec §3).
///
/// Invariant: if `schedule_enabled` then `cron_expression` must be a valid
/// cron form and `execution_type` must be `ScheduleOnly` or `Hybrid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChain {
    /// Unique identifier.
    pub id: RuleChainId,
    /// Owning organization.
    pub organization_id: OrganizationId,
    /// Human-readable name.
    pub name: String,
    /// When this chain is eligible to run.
    pub execution_type: ExecutionType,
    /// Whether this chain has an active schedule.
    pub schedule_enabled: bool,
    /// Cron expression, required when `schedule_enabled`.
    pub cron_expression: Option<String>,
    /// IANA timezone name the cron expression is interpreted in.
    pub timezone: Option<String>,
    /// Admission priority for schedule-fired events, 1..10.
    pub priority: u8,
    /// Maximum worker-level retries for jobs produced by this chain.
    pub max_retries: u32,
    /// Base retry delay in milliseconds.
    pub retry_delay_ms: u64,
    /// The ordered DAG of nodes, keyed by `RuleChainNode::id`.
    pub nodes: Vec<RuleChainNode>,
    /// The entry node to start traversal from.
    pub entry_node_id: Option<RuleChainNodeId>,
    /// Timestamp of the last execution, if any.
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_executed_at: Option<OffsetDateTime>,
    /// Total number of times this chain has executed.
    pub execution_count: u64,
    /// Total number of failed executions.
    pub failure_count: u64,
}

impl RuleChain {
    /// Validates the schedule invariant: a schedule-enabled chain must carry
    /// a cron expression and an execution type that permits scheduling.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message describing the violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.schedule_enabled {
            if self.cron_expression.as_deref().is_none_or(str::is_empty) {
                return Err(format!(
                    "rule chain {} has schedule_enabled but no cron_expression",
                    self.id
                ));
            }
            if !self.execution_type.allows_schedule() {
                return Err(format!(
                    "rule chain {} has schedule_enabled but execution_type {:?} does not allow scheduling",
                    self.id, self.execution_type
                ));
            }
        }
        Ok(())
    }
}

/// The type of a rule-chain node (spec §3, §4.7).
///
/// `PartialEq` only: `Requirement<FilterLeaf>` and `ActionValue` (via its
/// `serde_json::Value` literal) are not `Eq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeConfig {
    /// Evaluates a boolean expression over the snapshot; a failing top-level
    /// filter short-circuits the chain with `status = 'unmet'`.
    Filter {
        /// The AND/OR/NOT/group expression tree over filter leaves.
        requirement: Requirement<FilterLeaf>,
    },
    /// Computes a derived quantity and writes it back into the snapshot.
    Transform {
        /// The name the computed value is written under.
        output_name: String,
        /// The transform kind (the DSL for transform bodies is out of scope
        /// at the interface level; spec §1 scopes rule-chain language design
        /// as a non-goal).
        expression: String,
    },
    /// Emits a `{deviceUuid, stateName, value}` action command.
    Action {
        /// Target device originator.
        device_id: OriginatorId,
        /// State attribute to set.
        state_name: String,
        /// Literal value, or a snapshot-variable reference resolved at execution time.
        value: ActionValue,
    },
}

/// The value an action node emits: a literal, or a reference into the
/// snapshot resolved at execution time.
///
/// `PartialEq` only: `serde_json::Value` (the `Literal` payload) is not `Eq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    /// A literal JSON value.
    Literal(serde_json::Value),
    /// A reference to a snapshot variable, by name.
    SnapshotRef {
        /// The variable name to read from the snapshot at execution time.
        variable: String,
    },
}

/// A single node in a rule chain's DAG (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChainNode {
    /// Unique identifier, scoped to the owning chain.
    pub id: RuleChainNodeId,
    /// Owning rule chain.
    pub rule_chain_id: RuleChainId,
    /// The node's behavior.
    pub config: NodeConfig,
    /// The next node to traverse to, or `None` at the end of the chain.
    pub next_node_id: Option<RuleChainNodeId>,
}

/// The comparator a filter leaf applies (spec §4.7, SUPPLEMENT comparator set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

/// A single filter leaf: `snapshot[source_type].find(uuid)[key] op value` (spec §4.7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterLeaf {
    /// Which half of the snapshot to look the originator up in.
    pub source_type: crate::model::event::OriginatorType,
    /// The originator to look up.
    pub uuid: OriginatorId,
    /// The variable/state key to compare.
    pub key: VariableName,
    /// The comparator to apply.
    pub op: Comparator,
    /// The literal value to compare against.
    pub value: SnapshotValue,
}

impl Predicate for FilterLeaf {
    type Context<'a> = Snapshot;

    /// Unresolved references (originator or key absent from the snapshot)
    /// evaluate to `false`, never an error (spec §4.7).
    fn is_satisfied(&self, ctx: &Self::Context<'_>) -> bool {
        let Some(actual) = ctx.lookup(self.source_type, &self.uuid, &self.key) else {
            return false;
        };
        compare(actual, &self.value, self.op)
    }
}

/// Compares two snapshot values with the given comparator.
///
/// String operands only support `Eq`/`Ne`; ordering comparators against a
/// string are not comparable and are treated as unsatisfied, matching the
/// `Fatal` (non-comparable) treatment described for string `gt`/`lt` leaves.
fn compare(actual: &SnapshotValue, expected: &SnapshotValue, op: Comparator) -> bool {
    match op {
        Comparator::Eq => actual == expected,
        Comparator::Ne => actual != expected,
        Comparator::Gt | Comparator::Gte | Comparator::Lt | Comparator::Lte => {
            match (actual, expected) {
                (SnapshotValue::Number(a), SnapshotValue::Number(b)) => match op {
                    Comparator::Gt => a > b,
                    Comparator::Gte => a >= b,
                    Comparator::Lt => a < b,
                    Comparator::Lte => a <= b,
                    Comparator::Eq | Comparator::Ne => unreachable!(),
                },
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_enabled_without_cron_is_invalid() {
        let chain = RuleChain {
            id: RuleChainId::new("1"),
            organization_id: OrganizationId::new("org"),
            name: "t".into(),
            execution_type: ExecutionType::ScheduleOnly,
            schedule_enabled: true,
            cron_expression: None,
            timezone: None,
            priority: 1,
            max_retries: 3,
            retry_delay_ms: 500,
            nodes: vec![],
            entry_node_id: None,
            last_executed_at: None,
            execution_count: 0,
            failure_count: 0,
        };
        assert!(chain.validate().is_err());
    }

    #[test]
    fn string_ordering_comparison_is_unsatisfied() {
        let leaf = FilterLeaf {
            source_type: crate::model::event::OriginatorType::Sensor,
            uuid: OriginatorId::new("s1"),
            key: VariableName::new("name"),
            op: Comparator::Gt,
            value: SnapshotValue::String("b".into()),
        };
        assert!(!compare(&SnapshotValue::String("a".into()), &leaf.value, Comparator::Gt));
    }
}
