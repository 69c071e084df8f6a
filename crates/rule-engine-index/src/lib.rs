// rule-engine-index/src/lib.rs
// ============================================================================
// Module: Originator Index (C1)
// Description: Cache-coherent lookup mapping (sourceType, originatorId,
//              variableName) to matching rule chains (spec §4.1).
// Purpose: Implements `rule_engine_core::OriginatorIndex` over the shared
//          cache and the relational store.
// Dependencies: rule-engine-cache, rule-engine-store-sqlite, rule-engine-core
// ============================================================================

//! ## Overview
//! [`StoreBackedIndex`] is the concrete [`OriginatorIndex`] the worker
//! depends on through the trait seam in `rule-engine-core::interfaces`
//! (spec §9). A lookup tries the cache first; on a miss it runs the store's
//! rebuild query on a blocking thread (`rusqlite` is synchronous) and
//! repopulates the cache. Per spec §4.1, a store failure returns an empty
//! set rather than propagating — callers would otherwise treat a transient
//! index outage as "no rule chains match," which fails closed by simply
//! skipping the event rather than misrouting it.
//!
//! Every store visit also reads the `MigrationLog` version alongside the
//! rebuild query, at no extra round trip. An advance since the last
//! observed version forces a whole-cache [`invalidate_all`](OriginatorIndex::invalidate_all)
//! rather than waiting for each entry's TTL (spec §2 `[SUPPLEMENT]`).

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use rule_engine_cache::IndexCache;
use rule_engine_core::IndexError;
use rule_engine_core::OriginatorId;
use rule_engine_core::OriginatorIndex;
use rule_engine_core::OriginatorType;
use rule_engine_core::RuleChainId;
use rule_engine_core::VariableName;
use rule_engine_store_sqlite::SqliteStore;

/// Sentinel meaning "no `MigrationLog` version observed yet" — the first
/// store visit after startup records the current version without treating
/// it as an advance.
const VERSION_UNOBSERVED: i64 = -1;

/// A cache-coherent [`OriginatorIndex`] over a [`SqliteStore`] (or any
/// future relational backend exposing the same rebuild query shape).
pub struct StoreBackedIndex {
    cache: IndexCache,
    store: Arc<SqliteStore>,
    /// Last `MigrationLog` version observed on a store visit (spec §2
    /// `[SUPPLEMENT]`). Checked alongside the rebuild query rather than on
    /// every lookup, since cache hits never touch the store at all.
    last_migration_version: AtomicI64,
}

impl StoreBackedIndex {
    /// Builds an index over a shared cache and store.
    #[must_use]
    pub fn new(cache: IndexCache, store: Arc<SqliteStore>) -> Self {
        Self { cache, store, last_migration_version: AtomicI64::new(VERSION_UNOBSERVED) }
    }

    /// Compares a freshly-read `MigrationLog` version against the last one
    /// observed, force-invalidating the whole index cache if it advanced.
    async fn note_migration_version(&self, current: i64) {
        let previous = self.last_migration_version.swap(current, Ordering::SeqCst);
        if previous != VERSION_UNOBSERVED && current != previous {
            tracing::info!(previous, current, "migration log advanced, force-invalidating index cache");
            if let Err(err) = self.cache.invalidate_all().await {
                tracing::warn!(error = %err, "index cache invalidate_all failed");
            }
        }
    }
}

#[async_trait]
impl OriginatorIndex for StoreBackedIndex {
    async fn lookup(
        &self,
        source_type: OriginatorType,
        originator_id: &OriginatorId,
        variable_names: &[VariableName],
    ) -> Result<Vec<RuleChainId>, IndexError> {
        // Cache coherency (spec §8 invariant 1) only holds per distinct
        // variable name, so a multi-variable lookup is served from the
        // cache only when every name is individually cached.
        let mut cached = Vec::new();
        let mut all_hit = !variable_names.is_empty();
        for variable_name in variable_names {
            match self.cache.get(source_type, originator_id, variable_name).await {
                Ok(Some(ids)) => cached.extend(ids),
                Ok(None) => {
                    all_hit = false;
                    break;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "index cache read failed, falling back to store");
                    all_hit = false;
                    break;
                }
            }
        }
        if all_hit {
            cached.sort();
            cached.dedup();
            return Ok(cached);
        }

        let store = Arc::clone(&self.store);
        let originator_id_owned = originator_id.clone();
        let variable_names_owned = variable_names.to_vec();
        let result = tokio::task::spawn_blocking(move || {
            let version = store.migration_log_version();
            let ids = store.rule_chains_referencing(&originator_id_owned, &variable_names_owned);
            (version, ids)
        })
        .await;

        let (version, ids) = match result {
            Ok(pair) => pair,
            Err(join_err) => {
                tracing::warn!(error = %join_err, "index rebuild task panicked, returning empty set");
                return Ok(Vec::new());
            }
        };

        match version {
            Ok(current) => self.note_migration_version(current).await,
            Err(err) => tracing::warn!(error = %err, "migration log read failed, skipping advance check"),
        }

        let rule_chain_ids = match ids {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(error = %err, "index rebuild query failed, returning empty set");
                return Ok(Vec::new());
            }
        };

        for variable_name in variable_names {
            if let Err(err) = self.cache.set(source_type, originator_id, variable_name, &rule_chain_ids).await {
                tracing::warn!(error = %err, "index cache write failed");
            }
        }
        Ok(rule_chain_ids)
    }

    async fn invalidate(&self, source_type: OriginatorType, originator_id: &OriginatorId) {
        if let Err(err) = self.cache.invalidate(source_type, originator_id).await {
            tracing::warn!(error = %err, "index cache invalidate failed");
        }
    }

    async fn invalidate_by_rule_chain(&self, rule_chain_id: &RuleChainId) {
        if let Err(err) = self.cache.invalidate_by_rule_chain(rule_chain_id).await {
            tracing::warn!(error = %err, "index cache invalidate_by_rule_chain failed");
        }
    }

    async fn invalidate_all(&self) {
        if let Err(err) = self.cache.invalidate_all().await {
            tracing::warn!(error = %err, "index cache invalidate_all failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use rule_engine_core::ExecutionType;
    use rule_engine_core::NodeConfig;
    use rule_engine_core::OrganizationId;
    use rule_engine_core::RuleChain;
    use rule_engine_core::RuleChainNode;
    use rule_engine_core::RuleChainNodeId;
    use rule_logic::Requirement;

    use super::*;

    // Exercises the store fallback path directly; the Redis-backed cache
    // path requires a live Redis instance and is covered by
    // `system-tests` instead.
    #[tokio::test]
    async fn store_fallback_returns_empty_on_no_match() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let leaf = rule_engine_core::FilterLeaf {
            source_type: OriginatorType::Sensor,
            uuid: OriginatorId::new("sensor-1"),
            key: VariableName::new("temperature"),
            op: rule_engine_core::Comparator::Gt,
            value: rule_engine_core::SnapshotValue::Number(10.0),
        };
        let chain = RuleChain {
            id: RuleChainId::new("chain-1"),
            organization_id: OrganizationId::new("org-1"),
            name: "t".into(),
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
        };
        store.upsert_rule_chain(&chain).unwrap();

        let matches = store
            .rule_chains_referencing(&OriginatorId::new("sensor-other"), &[VariableName::new("temperature")])
            .unwrap();
        assert!(matches.is_empty());

        let matches = store
            .rule_chains_referencing(&OriginatorId::new("sensor-1"), &[VariableName::new("temperature")])
            .unwrap();
        assert_eq!(matches, vec![chain.id]);
    }
}
