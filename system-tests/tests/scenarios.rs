// system-tests/tests/scenarios.rs
// ============================================================================
// Module: Cross-Crate Scenario Tests
// Description: End-to-end scenarios wiring C1, C3, and C4 against a live
//              Redis and an on-disk SQLite store (spec §8's S1, S2, S6, plus
//              the §2 `[SUPPLEMENT]` migration-log scenario S7 — the
//              scenarios that need a real cache/queue substrate rather than
//              the pure, already-unit-tested pieces).
// Purpose: Catch wiring mistakes between crates that per-crate unit tests,
//          each exercising one collaborator in isolation, cannot see.
// Dependencies: rule-engine-bus, rule-engine-cache, rule-engine-core,
//               rule-engine-index, rule-engine-queue, rule-engine-store-sqlite,
//               rule-logic, tokio
// ============================================================================

//! ## Overview
//! These tests require a Redis instance reachable at `REDIS_URL` (default
//! `redis://127.0.0.1:6379`) and are gated behind the `system-tests` feature
//! so a plain `cargo test` never depends on external services. Run with:
//! `cargo test -p system-tests --features system-tests`.
//!
//! S3 (per-chain breaker), S4 (schedule firing), and S5 (numeric coercion)
//! are exercised as pure/single-crate unit tests already (`rule-engine-core`,
//! `rule-engine-scheduler`, `rule-engine-collector` respectively) and are not
//! repeated here.

use std::sync::Arc;

use rule_engine_cache::CacheHandle;
use rule_engine_cache::IndexCache;
use rule_engine_core::Event;
use rule_engine_core::EventType;
use rule_engine_core::ExecutionType;
use rule_engine_core::FilterLeaf;
use rule_engine_core::NodeConfig;
use rule_engine_core::OrganizationId;
use rule_engine_core::OriginatorId;
use rule_engine_core::OriginatorIndex;
use rule_engine_core::OriginatorType;
use rule_engine_core::RuleChain;
use rule_engine_core::RuleChainId;
use rule_engine_core::RuleChainNode;
use rule_engine_core::RuleChainNodeId;
use rule_engine_core::SnapshotValue;
use rule_engine_core::Admission;
use rule_engine_core::Comparator;
use rule_engine_core::VariableName;
use rule_engine_bus::EventBus;
use rule_engine_index::StoreBackedIndex;
use rule_engine_queue::Queue;
use rule_engine_store_sqlite::SqliteStore;
use rule_logic::Requirement;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Builds a one-node rule chain whose only filter leaf matches
/// `(source_type, originator, variable_name)`.
fn chain_matching(id: &str, source_type: OriginatorType, originator: &OriginatorId, variable_name: &VariableName) -> RuleChain {
    let leaf = FilterLeaf {
        source_type,
        uuid: originator.clone(),
        key: variable_name.clone(),
        op: Comparator::Gt,
        value: SnapshotValue::Number(0.0),
    };
    RuleChain {
        id: RuleChainId::new(id),
        organization_id: OrganizationId::new("org-1"),
        name: format!("chain-{id}"),
        execution_type: ExecutionType::EventTriggered,
        schedule_enabled: false,
        cron_expression: None,
        timezone: None,
        priority: 5,
        max_retries: 3,
        retry_delay_ms: 500,
        nodes: vec![RuleChainNode {
            id: RuleChainNodeId::new("n1"),
            rule_chain_id: RuleChainId::new(id),
            config: NodeConfig::Filter { requirement: Requirement::predicate(leaf) },
            next_node_id: None,
        }],
        entry_node_id: Some(RuleChainNodeId::new("n1")),
        last_executed_at: None,
        execution_count: 0,
        failure_count: 0,
    }
}

// No dedicated flush primitive is exposed on `CacheHandle`; each test below
// scopes its keys under a unique originator/queue name instead of flushing
// the database between runs.
async fn connect_cache() -> CacheHandle {
    CacheHandle::connect(&redis_url()).await.expect("connect to redis for system tests (set REDIS_URL)")
}

/// **S1 – Skip by no-match.** A chain filters on sensor `A`'s `temperature`;
/// an event from sensor `B` naming `temperature` resolves to no chains and
/// is skipped without enqueuing.
#[tokio::test]
async fn s1_skip_by_no_match() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("open in-memory store"));
    let sensor_a = OriginatorId::new("sensor-a-s1");
    let temperature = VariableName::new("temperature");
    store.upsert_rule_chain(&chain_matching("chain-s1", OriginatorType::Sensor, &sensor_a, &temperature)).expect("seed chain");

    let cache = connect_cache().await;
    let index: Arc<dyn OriginatorIndex> = Arc::new(StoreBackedIndex::new(IndexCache::new(cache.clone()), Arc::clone(&store)));
    let queue = Arc::new(Queue::new(cache.clone(), "system-tests-s1"));
    let thresholds = rule_engine_core::Thresholds { warning: 1_000, critical: 2_000, recovery: 500 };
    let bus = EventBus::new(index, Arc::clone(&queue), thresholds, true);

    let before = queue.counts().await.expect("counts").total_pending();

    let event = Event {
        event_type: EventType::TelemetryData,
        originator_type: OriginatorType::Sensor,
        originator_id: Some(OriginatorId::new("sensor-b-s1")),
        variable_names: vec![temperature],
        payload: serde_json::json!({}),
        priority: 5,
        rule_chain_ids: Vec::new(),
        enqueued_at: time::OffsetDateTime::now_utc(),
    };
    let admission = bus.emit_event(event).await.expect("emit_event");
    assert!(matches!(admission, Admission::Skipped { reason: rule_engine_core::SkippedReason::NoRuleChains }));

    let after = queue.counts().await.expect("counts").total_pending();
    assert_eq!(before, after, "queue depth must be unchanged on a skip");
}

/// **S2 – Priority override under a critical queue.** Scaled down from the
/// spec's 50,000-job example to a handful of real enqueued jobs so the test
/// runs in milliseconds against a live queue instead of simulating depth.
#[tokio::test]
async fn s2_priority_override_under_critical_queue() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("open in-memory store"));
    let cache = connect_cache().await;
    let index: Arc<dyn OriginatorIndex> = Arc::new(StoreBackedIndex::new(IndexCache::new(cache.clone()), Arc::clone(&store)));
    let queue = Arc::new(Queue::new(cache.clone(), "system-tests-s2"));
    // Small thresholds so a handful of real jobs crosses `critical`.
    let thresholds = rule_engine_core::Thresholds { warning: 2, critical: 3, recovery: 1 };
    let bus = EventBus::new(Arc::clone(&index), Arc::clone(&queue), thresholds, true);

    for n in 0..4 {
        let event = Event {
            event_type: EventType::External,
            originator_type: OriginatorType::None,
            originator_id: None,
            variable_names: Vec::new(),
            payload: serde_json::json!({ "seed": n }),
            priority: 5,
            rule_chain_ids: Vec::new(),
            enqueued_at: time::OffsetDateTime::now_utc(),
        };
        let _ = bus.emit_event(event).await.expect("seed emit_event");
    }

    let high_priority = Event {
        event_type: EventType::Scheduled,
        originator_type: OriginatorType::None,
        originator_id: None,
        variable_names: Vec::new(),
        payload: serde_json::json!({}),
        priority: 1,
        rule_chain_ids: Vec::new(),
        enqueued_at: time::OffsetDateTime::now_utc(),
    };
    let admission = bus.emit_event(high_priority).await.expect("emit_event");
    assert!(matches!(admission, Admission::Accepted { .. }), "priority 1 must override an open circuit");

    let low_priority = Event {
        event_type: EventType::TelemetryData,
        originator_type: OriginatorType::None,
        originator_id: None,
        variable_names: Vec::new(),
        payload: serde_json::json!({}),
        priority: 5,
        rule_chain_ids: Vec::new(),
        enqueued_at: time::OffsetDateTime::now_utc(),
    };
    let admission = bus.emit_event(low_priority).await.expect("emit_event");
    assert!(matches!(admission, Admission::Rejected { reason: rule_engine_core::RejectedReason::QueueCritical, .. }));
}

/// **S6 – Variable-level index caching.** A first lookup populates the
/// cache from the store; the chain is then deleted directly from the store
/// (bypassing `invalidate`), and a second lookup for the same triple still
/// returns the original result, proving it was served from cache rather
/// than re-querying the store. A third lookup after an explicit
/// `invalidate` observes the now-empty store.
#[tokio::test]
async fn s6_variable_level_index_caching() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("open in-memory store"));
    let sensor = OriginatorId::new("sensor-x-s6");
    let temperature = VariableName::new("temperature");
    let chain = chain_matching("chain-s6", OriginatorType::Sensor, &sensor, &temperature);
    store.upsert_rule_chain(&chain).expect("seed chain");

    let cache = connect_cache().await;
    let index = StoreBackedIndex::new(IndexCache::new(cache.clone()), Arc::clone(&store));

    let first = index.lookup(OriginatorType::Sensor, &sensor, std::slice::from_ref(&temperature)).await.expect("first lookup");
    assert_eq!(first, vec![chain.id.clone()]);

    store.delete_rule_chain(&chain.id).expect("delete chain from store directly");

    let second = index.lookup(OriginatorType::Sensor, &sensor, std::slice::from_ref(&temperature)).await.expect("second lookup");
    assert_eq!(second, first, "second lookup must still be served from cache, not the now-empty store");

    index.invalidate(OriginatorType::Sensor, &sensor).await;

    let third = index.lookup(OriginatorType::Sensor, &sensor, std::slice::from_ref(&temperature)).await.expect("third lookup");
    assert!(third.is_empty(), "post-invalidate lookup must observe the store's current (now-empty) state");
}

/// **S7 – Migration log advance force-invalidates the index.** A lookup
/// populates the cache; the chain is deleted directly from the store
/// (bypassing `invalidate`, same setup as S6) and the store's migration log
/// is bumped. A *different* triple's lookup — which is what drives the
/// version check, since it's read alongside that lookup's own store visit —
/// must observe the bump and force-invalidate the whole cache, so the
/// original triple's next lookup re-queries the now-empty store instead of
/// serving a stale hit.
#[tokio::test]
async fn s7_migration_log_advance_forces_invalidation() {
    let store = Arc::new(SqliteStore::open_in_memory().expect("open in-memory store"));
    let sensor = OriginatorId::new("sensor-x-s7");
    let temperature = VariableName::new("temperature");
    let chain = chain_matching("chain-s7", OriginatorType::Sensor, &sensor, &temperature);
    store.upsert_rule_chain(&chain).expect("seed chain");

    // Two throwaway triples that never match any chain, used only to force
    // a store visit (and thus a version read) without touching the cache
    // entry under test.
    let primer_a = OriginatorId::new("sensor-primer-a-s7");
    let primer_b = OriginatorId::new("sensor-primer-b-s7");
    let primer_var = VariableName::new("unused");

    let cache = connect_cache().await;
    let index = StoreBackedIndex::new(IndexCache::new(cache.clone()), Arc::clone(&store));

    // Observes the starting migration version without marking it as an
    // advance (the first store visit this index instance ever makes).
    index.lookup(OriginatorType::Sensor, &primer_a, std::slice::from_ref(&primer_var)).await.expect("prime version");

    let first = index.lookup(OriginatorType::Sensor, &sensor, std::slice::from_ref(&temperature)).await.expect("first lookup");
    assert_eq!(first, vec![chain.id.clone()]);

    store.delete_rule_chain(&chain.id).expect("delete chain from store directly");
    store.bump_migration_log().expect("bump migration log");

    // A fresh triple guarantees a cache miss, so this lookup's own store
    // visit is what reads the new version and must force-invalidate before
    // the earlier cached entry is next read.
    index.lookup(OriginatorType::Sensor, &primer_b, std::slice::from_ref(&primer_var)).await.expect("observe version bump");

    let second = index.lookup(OriginatorType::Sensor, &sensor, std::slice::from_ref(&temperature)).await.expect("second lookup");
    assert!(second.is_empty(), "migration log advance must have force-invalidated the cached entry");
}
