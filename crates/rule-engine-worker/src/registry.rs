// rule-engine-worker/src/registry.rs
// ============================================================================
// Module: Execution-Type Registry & Store-Backed Chain Provider
// Description: C5's non-blocking in-memory execution-type lookup, and the
//              store-backed `RuleChainProvider` C6 reads full chains through.
// Purpose: Keep C5's lookup a pure in-memory map (spec §4.5: "non-blocking"),
//          separate from the I/O-bound full chain fetch C7 needs.
// Dependencies: dashmap, rule-engine-store-sqlite, tokio
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rule_engine_core::ChainLookupError;
use rule_engine_core::ExecutionType;
use rule_engine_core::ExecutionTypeLookup;
use rule_engine_core::RuleChain;
use rule_engine_core::RuleChainId;
use rule_engine_core::RuleChainProvider;
use rule_engine_store_sqlite::SqliteStore;

/// A non-blocking, in-memory `rule_chain_id -> execution_type` map (spec
/// §4.5). Populated from the store at startup and kept current by
/// [`Self::upsert`]/[`Self::remove`] whenever a chain is written or deleted,
/// rather than queried per invocation.
#[derive(Default)]
pub struct ExecutionTypeIndex {
    entries: DashMap<RuleChainId, ExecutionType>,
}

impl ExecutionTypeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the index from a full rule-chain listing, e.g. at startup.
    pub fn load(&self, chains: &[RuleChain]) {
        for chain in chains {
            self.entries.insert(chain.id.clone(), chain.execution_type);
        }
    }

    /// Records or updates one chain's execution type.
    pub fn upsert(&self, rule_chain_id: RuleChainId, execution_type: ExecutionType) {
        self.entries.insert(rule_chain_id, execution_type);
    }

    /// Forgets a deleted chain.
    pub fn remove(&self, rule_chain_id: &RuleChainId) {
        self.entries.remove(rule_chain_id);
    }
}

impl ExecutionTypeLookup for ExecutionTypeIndex {
    fn execution_type_of(&self, rule_chain_id: &RuleChainId) -> Option<ExecutionType> {
        self.entries.get(rule_chain_id).map(|entry| *entry)
    }
}

/// A [`RuleChainProvider`] over a `rusqlite`-backed store, running the
/// synchronous read on a blocking thread (same pattern as
/// `rule-engine-index::StoreBackedIndex`).
pub struct StoreChainProvider {
    store: Arc<SqliteStore>,
}

impl StoreChainProvider {
    /// Wraps a shared store.
    #[must_use]
    pub const fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RuleChainProvider for StoreChainProvider {
    async fn get(&self, rule_chain_id: &RuleChainId) -> Result<Option<RuleChain>, ChainLookupError> {
        let store = Arc::clone(&self.store);
        let rule_chain_id = rule_chain_id.clone();
        tokio::task::spawn_blocking(move || store.get_rule_chain(&rule_chain_id))
            .await
            .map_err(|err| ChainLookupError::Backend(err.to_string()))?
            .map_err(|err| ChainLookupError::Backend(err.to_string()))
    }
}
