// rule-engine-config/src/rule_chain.rs
// ============================================================================
// Module: Rule Chain Configuration Validation
// Description: Load-time validation of a `RuleChain` beyond the structural
//              checks `RuleChain::validate` already performs.
// Purpose: Catch config mistakes (dangling node references, cycles, depth)
//          before a chain is ever admitted to the store.
// Dependencies: rule-engine-core
// ============================================================================

use rule_engine_core::RuleChain;

use crate::error::ConfigError;

/// Maximum filter requirement tree depth accepted in a rule chain
/// configuration (mirrors `rule_logic::builder::DEFAULT_MAX_DEPTH`).
pub const MAX_FILTER_DEPTH: usize = 32;

/// Validates a [`RuleChain`] read from configuration: runs the chain's own
/// structural validation, rejects dangling `entry_node_id`/`next_node_id`
/// references, and rejects cycles (spec §8 invariant covering `Fatal`
/// structural errors).
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] on any of the above.
pub fn validate_rule_chain(chain: &RuleChain) -> Result<(), ConfigError> {
    chain.validate().map_err(ConfigError::Invalid)?;

    let known_ids: std::collections::HashSet<_> = chain.nodes.iter().map(|node| &node.id).collect();
    if let Some(entry) = &chain.entry_node_id {
        if !known_ids.contains(entry) {
            return Err(ConfigError::Invalid(format!(
                "entry_node_id {entry:?} does not reference any node in the chain"
            )));
        }
    } else if !chain.nodes.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "rule chain {:?} has nodes but no entry_node_id",
            chain.id
        )));
    }
    for node in &chain.nodes {
        if let Some(next) = &node.next_node_id {
            if !known_ids.contains(next) {
                return Err(ConfigError::Invalid(format!(
                    "node {:?} references unknown next_node_id {next:?}",
                    node.id
                )));
            }
        }
    }
    if chain.detect_cycle() {
        return Err(ConfigError::Invalid(format!(
            "rule chain {:?} contains a cycle in its node graph",
            chain.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rule_engine_core::ExecutionType;
    use rule_engine_core::NodeConfig;
    use rule_engine_core::RuleChainId;
    use rule_engine_core::RuleChainNode;
    use rule_engine_core::RuleChainNodeId;
    use rule_logic::Requirement;

    use super::*;

    fn minimal_chain() -> RuleChain {
        RuleChain {
            id: RuleChainId::new("chain-1"),
            organization_id: rule_engine_core::OrganizationId::new("org-1"),
            name: "test".to_string(),
            execution_type: ExecutionType::EventTriggered,
            schedule_enabled: false,
            cron_expression: None,
            timezone: None,
            priority: 5,
            max_retries: 3,
            retry_delay_ms: 500,
            nodes: vec![RuleChainNode {
                id: RuleChainNodeId::new("node-1"),
                rule_chain_id: RuleChainId::new("chain-1"),
                config: NodeConfig::Filter { requirement: Requirement::default() },
                next_node_id: None,
            }],
            entry_node_id: Some(RuleChainNodeId::new("missing")),
            last_executed_at: None,
            execution_count: 0,
            failure_count: 0,
        }
    }

    #[test]
    fn rejects_dangling_entry_node() {
        let chain = minimal_chain();
        assert!(validate_rule_chain(&chain).is_err());
    }
}
