// rule-engine-core/src/executor.rs
// ============================================================================
// Module: Rule Chain Executor (C7)
// Description: Evaluates a filter/transform/action DAG against a snapshot
//              (spec §4.7).
// Purpose: Pure, referentially transparent traversal; actions are emitted,
//          never applied (C10's job).
// Dependencies: rule-logic, crate::model
// ============================================================================

//! ## Overview
//! [`execute`] walks a [`RuleChain`]'s nodes linearly by `next_node_id`.
//! Cycles are rejected by [`RuleChain::detect_cycle`] before a chain is ever
//! handed to the executor (load-time validation, not a per-call check); the
//! executor itself only enforces the depth budget as a structural
//! fail-safe.

use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::model::ids::RuleChainId;
use crate::model::ids::RuleChainNodeId;
use crate::model::rule_chain::ActionValue;
use crate::model::rule_chain::NodeConfig;
use crate::model::rule_chain::RuleChain;
use crate::model::snapshot::Snapshot;
use crate::model::snapshot::SnapshotValue;

/// Default maximum traversal depth (spec §4.7).
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// The outcome status of one chain execution (spec §4.7 contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Every node ran to completion.
    Success,
    /// A top-level filter failed, short-circuiting the chain.
    Unmet,
    /// A structural error (cycle, missing node, depth exceeded) aborted the chain.
    Error,
}

/// An emitted action command (spec §4.7: `{deviceUuid, stateName, value}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCommand {
    /// The node that emitted this action.
    pub node_id: RuleChainNodeId,
    /// Target device originator.
    pub device_uuid: crate::model::ids::OriginatorId,
    /// State attribute to set.
    pub state_name: crate::model::ids::VariableName,
    /// The resolved value.
    pub value: serde_json::Value,
}

/// Per-node outcome, returned alongside the aggregate actions (spec §4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// The node that produced this result.
    pub node_id: RuleChainNodeId,
    /// Whether this node passed/ran successfully.
    pub passed: bool,
    /// A short human-readable summary.
    pub detail: String,
}

/// The aggregate result of [`execute`] (spec §4.7 contract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The overall status.
    pub status: ExecutionStatus,
    /// The chain's configured name.
    pub name: String,
    /// The chain that was executed.
    pub rule_chain_id: RuleChainId,
    /// A short human-readable summary of the outcome.
    pub summary: String,
    /// Per-node results in traversal order.
    pub node_results: Vec<NodeResult>,
    /// Actions emitted by `action` nodes, in traversal order.
    pub actions: Vec<ActionCommand>,
}

impl RuleChain {
    /// Detects a cycle in this chain's `next_node_id` traversal.
    ///
    /// Run at load time (when a chain is first accepted into the store or
    /// index), not on every execution; `execute` trusts its caller to have
    /// called this first.
    #[must_use]
    pub fn detect_cycle(&self) -> bool {
        let Some(entry) = &self.entry_node_id else {
            return false;
        };
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut current = Some(entry.clone());
        while let Some(node_id) = current {
            if !seen.insert(node_id.clone()) {
                return true;
            }
            current = self.nodes.iter().find(|n| n.id == node_id).and_then(|n| n.next_node_id.clone());
        }
        false
    }
}

/// Executes `chain` against `snapshot` (spec §4.7 contract).
///
/// # Errors
///
/// Returns `ExecutionStatus::Error` (not a `Result`) for structural faults:
/// exceeding `max_depth`, or a `next_node_id` pointing at a missing node.
/// These are chain-local faults and must not be surfaced as a crate-level
/// `Result::Err`, matching §7's "per-chain errors are isolated" design.
pub fn execute(chain: &RuleChain, mut snapshot: Snapshot, max_depth: usize, now: OffsetDateTime) -> ExecutionResult {
    let mut node_results = Vec::new();
    let mut actions = Vec::new();
    let mut current = chain.entry_node_id.clone();
    let mut depth = 0usize;

    while let Some(node_id) = current {
        depth += 1;
        if depth > max_depth {
            return ExecutionResult {
                status: ExecutionStatus::Error,
                name: chain.name.clone(),
                rule_chain_id: chain.id.clone(),
                summary: format!("traversal exceeded max depth {max_depth}"),
                node_results,
                actions,
            };
        }

        let Some(node) = chain.nodes.iter().find(|n| n.id == node_id) else {
            return ExecutionResult {
                status: ExecutionStatus::Error,
                name: chain.name.clone(),
                rule_chain_id: chain.id.clone(),
                summary: format!("node {node_id} referenced but not found"),
                node_results,
                actions,
            };
        };

        match &node.config {
            NodeConfig::Filter {
                requirement,
            } => {
                let passed = requirement.eval(&snapshot);
                node_results.push(NodeResult {
                    node_id: node.id.clone(),
                    passed,
                    detail: if passed { "filter matched".into() } else { "filter did not match".into() },
                });
                if !passed {
                    return ExecutionResult {
                        status: ExecutionStatus::Unmet,
                        name: chain.name.clone(),
                        rule_chain_id: chain.id.clone(),
                        summary: format!("filter node {node_id} was not satisfied"),
                        node_results,
                        actions,
                    };
                }
            }
            NodeConfig::Transform {
                output_name,
                expression,
            } => {
                // Transform expression evaluation is out of scope at the
                // interface level (spec §1 non-goal: rule-chain language
                // design); this records the intent without computing a value.
                node_results.push(NodeResult {
                    node_id: node.id.clone(),
                    passed: true,
                    detail: format!("transform `{output_name}` <- `{expression}`"),
                });
            }
            NodeConfig::Action {
                device_id,
                state_name,
                value,
            } => {
                let resolved = resolve_action_value(value, &snapshot);
                node_results.push(NodeResult {
                    node_id: node.id.clone(),
                    passed: true,
                    detail: format!("action emitted for {device_id}.{state_name}"),
                });
                actions.push(ActionCommand {
                    node_id: node.id.clone(),
                    device_uuid: device_id.clone(),
                    state_name: state_name.as_str().into(),
                    value: resolved,
                });
            }
        }

        current = node.next_node_id.clone();
    }

    let _ = now;
    ExecutionResult {
        status: ExecutionStatus::Success,
        name: chain.name.clone(),
        rule_chain_id: chain.id.clone(),
        summary: format!("executed {} node(s)", node_results.len()),
        node_results,
        actions,
    }
}

fn resolve_action_value(value: &ActionValue, snapshot: &Snapshot) -> serde_json::Value {
    match value {
        ActionValue::Literal(v) => v.clone(),
        ActionValue::SnapshotRef {
            variable,
        } => {
            let key = crate::model::ids::VariableName::new(variable.as_str());
            snapshot
                .sensor_data
                .values()
                .chain(snapshot.device_data.values())
                .find_map(|record| record.values.get(&key))
                .map_or(serde_json::Value::Null, snapshot_value_to_json)
        }
    }
}

fn snapshot_value_to_json(value: &SnapshotValue) -> serde_json::Value {
    match value {
        SnapshotValue::Number(n) => serde_json::Number::from_f64(*n).map_or(serde_json::Value::Null, serde_json::Value::Number),
        SnapshotValue::Boolean(b) => serde_json::Value::Bool(*b),
        SnapshotValue::String(s) => serde_json::Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::OriginatorType;
    use crate::model::ids::OrganizationId;
    use crate::model::ids::OriginatorId;
    use crate::model::ids::VariableName;
    use crate::model::rule_chain::Comparator;
    use crate::model::rule_chain::ExecutionType;
    use crate::model::rule_chain::FilterLeaf;
    use crate::model::rule_chain::RuleChainNode;
    use crate::model::snapshot::OriginatorRecord;
    use rule_logic::Requirement;
    use std::collections::HashMap;

    fn chain_with_nodes(nodes: Vec<RuleChainNode>, entry: RuleChainNodeId) -> RuleChain {
        RuleChain {
            id: RuleChainId::new("c1"),
            organization_id: OrganizationId::new("org"),
            name: "test chain".into(),
            execution_type: ExecutionType::EventTriggered,
            schedule_enabled: false,
            cron_expression: None,
            timezone: None,
            priority: 5,
            max_retries: 3,
            retry_delay_ms: 500,
            nodes,
            entry_node_id: Some(entry),
            last_executed_at: None,
            execution_count: 0,
            failure_count: 0,
        }
    }

    fn snapshot_with(uuid: &OriginatorId, key: &VariableName, value: SnapshotValue) -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.sensor_data.insert(
            uuid.clone(),
            OriginatorRecord {
                uuid: uuid.clone(),
                values: HashMap::from([(key.clone(), value)]),
                timestamp: OffsetDateTime::UNIX_EPOCH,
            },
        );
        snapshot
    }

    #[test]
    fn failing_top_level_filter_short_circuits_with_unmet() {
        let uuid = OriginatorId::new("sensor-1");
        let key = VariableName::new("temperature");
        let filter_node = RuleChainNode {
            id: RuleChainNodeId::new("n1"),
            rule_chain_id: RuleChainId::new("c1"),
            config: NodeConfig::Filter {
                requirement: Requirement::predicate(FilterLeaf {
                    source_type: OriginatorType::Sensor,
                    uuid: uuid.clone(),
                    key: key.clone(),
                    op: Comparator::Gt,
                    value: SnapshotValue::Number(100.0),
                }),
            },
            next_node_id: None,
        };
        let chain = chain_with_nodes(vec![filter_node], RuleChainNodeId::new("n1"));
        let snapshot = snapshot_with(&uuid, &key, SnapshotValue::Number(10.0));

        let result = execute(&chain, snapshot, DEFAULT_MAX_DEPTH, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(result.status, ExecutionStatus::Unmet);
        assert!(result.actions.is_empty());
    }

    #[test]
    fn matching_filter_then_action_emits_command() {
        let uuid = OriginatorId::new("sensor-1");
        let key = VariableName::new("temperature");
        let action_node = RuleChainNode {
            id: RuleChainNodeId::new("n2"),
            rule_chain_id: RuleChainId::new("c1"),
            config: NodeConfig::Action {
                device_id: OriginatorId::new("device-1"),
                state_name: "alarm".into(),
                value: ActionValue::Literal(serde_json::json!(true)),
            },
            next_node_id: None,
        };
        let filter_node = RuleChainNode {
            id: RuleChainNodeId::new("n1"),
            rule_chain_id: RuleChainId::new("c1"),
            config: NodeConfig::Filter {
                requirement: Requirement::predicate(FilterLeaf {
                    source_type: OriginatorType::Sensor,
                    uuid: uuid.clone(),
                    key: key.clone(),
                    op: Comparator::Gt,
                    value: SnapshotValue::Number(5.0),
                }),
            },
            next_node_id: Some(RuleChainNodeId::new("n2")),
        };
        let chain = chain_with_nodes(vec![filter_node, action_node], RuleChainNodeId::new("n1"));
        let snapshot = snapshot_with(&uuid, &key, SnapshotValue::Number(10.0));

        let result = execute(&chain, snapshot, DEFAULT_MAX_DEPTH, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].state_name.as_str(), "alarm");
    }

    #[test]
    fn cycle_is_detected_at_load_time() {
        let a = RuleChainNode {
            id: RuleChainNodeId::new("a"),
            rule_chain_id: RuleChainId::new("c1"),
            config: NodeConfig::Transform {
                output_name: "x".into(),
                expression: "1".into(),
            },
            next_node_id: Some(RuleChainNodeId::new("b")),
        };
        let b = RuleChainNode {
            id: RuleChainNodeId::new("b"),
            rule_chain_id: RuleChainId::new("c1"),
            config: NodeConfig::Transform {
                output_name: "y".into(),
                expression: "1".into(),
            },
            next_node_id: Some(RuleChainNodeId::new("a")),
        };
        let chain = chain_with_nodes(vec![a, b], RuleChainNodeId::new("a"));
        assert!(chain.detect_cycle());
    }
}
