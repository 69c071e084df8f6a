// rule-engine-worker/src/lib.rs
// ============================================================================
// Module: Worker Pool (C6) + Execution-Type Filter Integration (C5)
// Description: Leases jobs, filters candidate chains by execution type,
//              runs each chain through C7, and isolates per-chain faults
//              behind a circuit breaker (spec §4.5, §4.6).
// Purpose: The consumer side of the durable queue; owns the per-chain
//          breaker registry so one misbehaving chain never blocks others.
// Dependencies: rule-engine-core, rule-engine-queue, rule-engine-collector,
//               rule-engine-metrics, rule-logic, dashmap, tokio
// ============================================================================

//! ## Overview
//! [`WorkerPool::run`] spawns `concurrency` tasks that loop
//! lease-process-ack/fail. Each lease is routed through C5's
//! [`filter_by_execution_type`] (bypassed for `ManualTrigger`, spec §4.5),
//! then the eligible chains fan out to concurrent [`JoinSet`](tokio::task::JoinSet)
//! tasks and are joined before the job is acked. Each chain is gated by its
//! own [`ChainBreaker`] (spec §4.6, §8 invariant 4) and every collaborator
//! call C8's collector, C7's executor, and C10's bridge is bounded by its
//! own `withTimeout`-style budget, raising a structured [`TimeoutCode`] on
//! expiry. A job is acked once every eligible chain has been *attempted*;
//! per-chain faults and timeouts stay isolated in that chain's breaker and
//! counted against C11, never failing the job itself (spec §7). Only a
//! malformed job payload fails the job for retry.

mod error;
mod registry;

use std::sync::Arc;

use rule_engine_collector::DataCollector;
use rule_engine_collector::DataRequest;
use rule_engine_core::Admit;
use rule_engine_core::ChainBreaker;
use rule_engine_core::DeliveryBridge;
use rule_engine_core::Event;
use rule_engine_core::EventType;
use rule_engine_core::ExecutionStatus;
use rule_engine_core::InvocationKind;
use rule_engine_core::NodeConfig;
use rule_engine_core::RuleChainId;
use rule_engine_core::RuleChainProvider;
use rule_engine_core::TimeoutCode;
use rule_engine_core::execute;
use rule_engine_core::execution_filter::filter_by_execution_type;
use rule_engine_core::executor::DEFAULT_MAX_DEPTH;
use rule_engine_queue::Queue;
use rule_engine_metrics::MetricsRegistry;
use rule_logic::Requirement;
use time::Duration;
use time::OffsetDateTime;

/// Per-operation timeout budgets C6 enforces around its collaborators
/// (spec §4.6 "Timeouts").
#[derive(Debug, Clone, Copy)]
pub struct WorkerTimeouts {
    /// Bounds `collector.collect` (`DATA_COLLECTION_TIMEOUT`).
    pub data_collection_ms: u64,
    /// Bounds `execute` (`RULE_CHAIN_TIMEOUT`).
    pub rule_chain_ms: u64,
    /// Bounds the overall per-chain invocation (`WORKER_TIMEOUT`).
    pub worker_ms: u64,
    /// Bounds `bridge.apply_actions` (`EXTERNAL_ACTION_TIMEOUT`).
    pub external_action_ms: u64,
}

pub use crate::error::WorkerError;
pub use crate::registry::ExecutionTypeIndex;
pub use crate::registry::StoreChainProvider;

fn collect_leaves(requirement: &Requirement<rule_engine_core::FilterLeaf>, out: &mut Vec<DataRequest>) {
    match requirement {
        Requirement::Predicate(leaf) => out.push(DataRequest {
            source_type: leaf.source_type,
            uuid: leaf.uuid.clone(),
            key: leaf.key.clone(),
        }),
        Requirement::Not(inner) => collect_leaves(inner, out),
        Requirement::And(reqs) | Requirement::Or(reqs) => {
            for req in reqs {
                collect_leaves(req, out);
            }
        }
        Requirement::RequireGroup {
            reqs, ..
        } => {
            for req in reqs {
                collect_leaves(req, out);
            }
        }
    }
}

/// Owns the durable queue consumer loop, the per-chain breaker registry, and
/// the collaborators C6 needs: a chain repository, C5's execution-type
/// index, C8's collector, and C10's delivery bridge.
pub struct WorkerPool {
    queue: Arc<Queue>,
    chains: Arc<dyn RuleChainProvider>,
    execution_types: Arc<ExecutionTypeIndex>,
    collector: Arc<DataCollector>,
    bridge: Arc<dyn DeliveryBridge>,
    metrics: Arc<MetricsRegistry>,
    breakers: dashmap::DashMap<RuleChainId, ChainBreaker>,
    breaker_threshold: u32,
    breaker_recovery: Duration,
    max_depth: usize,
    timeouts: WorkerTimeouts,
}

impl WorkerPool {
    /// Builds a worker pool over its collaborators, using the default
    /// traversal depth (spec §4.7).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<Queue>,
        chains: Arc<dyn RuleChainProvider>,
        execution_types: Arc<ExecutionTypeIndex>,
        collector: Arc<DataCollector>,
        bridge: Arc<dyn DeliveryBridge>,
        metrics: Arc<MetricsRegistry>,
        breaker_threshold: u32,
        breaker_recovery: Duration,
        timeouts: WorkerTimeouts,
    ) -> Self {
        Self {
            queue,
            chains,
            execution_types,
            collector,
            bridge,
            metrics,
            breakers: dashmap::DashMap::new(),
            breaker_threshold,
            breaker_recovery,
            max_depth: DEFAULT_MAX_DEPTH,
            timeouts,
        }
    }

    /// Runs `concurrency` lease loops until cancelled. Each loop idles
    /// briefly when the queue is empty rather than busy-polling.
    pub async fn run(self: Arc<Self>, concurrency: usize) {
        let mut handles = Vec::with_capacity(concurrency);
        for _ in 0..concurrency {
            let pool = Arc::clone(&self);
            handles.push(tokio::spawn(async move {
                loop {
                    if !pool.run_once().await {
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Leases and processes at most one job. Returns `false` when the queue
    /// had nothing to lease, so callers can back off.
    pub async fn run_once(self: &Arc<Self>) -> bool {
        let job = match self.queue.lease().await {
            Ok(Some(job)) => job,
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(error = %err, "queue lease failed");
                return false;
            }
        };

        match self.process(&job).await {
            Ok(()) => {
                if let Err(err) = self.queue.ack(&job).await {
                    tracing::warn!(error = %err, job_id = %job.id, "queue ack failed");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, job_id = %job.id, "job processing aborted, scheduling retry");
                if let Err(err) = self.queue.fail(&job).await {
                    tracing::warn!(error = %err, job_id = %job.id, "queue fail-transition failed");
                }
            }
        }
        true
    }

    async fn process(self: &Arc<Self>, job: &rule_engine_queue::QueueJob) -> Result<(), WorkerError> {
        let event: Event = serde_json::from_value(job.payload.clone()).map_err(|err| WorkerError::MalformedPayload(err.to_string()))?;

        let bypass_filter = event.event_type == EventType::ManualTrigger;
        let candidates = if event.event_type == EventType::Scheduled {
            event
                .payload
                .get("rule_chain_id")
                .and_then(serde_json::Value::as_str)
                .map(|id| vec![RuleChainId::new(id)])
                .unwrap_or_default()
        } else {
            event.rule_chain_ids.clone()
        };

        let eligible = if bypass_filter || candidates.is_empty() {
            candidates
        } else {
            let kind = if event.event_type == EventType::Scheduled {
                InvocationKind::Schedule
            } else {
                InvocationKind::Event
            };
            let lookup = |id: &RuleChainId| self.execution_types.execution_type_of(id);
            let outcome = filter_by_execution_type(&candidates, kind, lookup);
            if outcome.fail_open {
                tracing::warn!("execution-type lookup failed open, running all candidates");
            }
            outcome.eligible
        };

        // Rule chains within one job fan out to concurrent evaluations and
        // are joined before the job is acked; a chain failure stays scoped
        // to its own breaker and never fails the job (spec §4.6, §7).
        let mut set = tokio::task::JoinSet::new();
        for rule_chain_id in eligible {
            let pool = Arc::clone(self);
            set.spawn(async move { pool.run_chain(&rule_chain_id).await });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "chain invocation task panicked");
            }
        }
        Ok(())
    }

    /// Runs one chain under its breaker and overall `WORKER_TIMEOUT` budget,
    /// recording the per-chain outcome and any timeout against C11 (spec
    /// §4.6, §4.11).
    async fn run_chain(&self, rule_chain_id: &RuleChainId) {
        let now = OffsetDateTime::now_utc();
        let admit = self
            .breakers
            .entry(rule_chain_id.clone())
            .or_insert_with(|| ChainBreaker::new(self.breaker_threshold, self.breaker_recovery))
            .on_call(now);
        if admit == Admit::Skip {
            tracing::debug!(rule_chain_id = %rule_chain_id, "chain breaker open, skipping invocation");
            return;
        }

        let start = std::time::Instant::now();
        let budget = std::time::Duration::from_millis(self.timeouts.worker_ms);
        match tokio::time::timeout(budget, self.run_chain_inner(rule_chain_id)).await {
            Ok(Some((organization_id, success))) => {
                if let Some(mut breaker) = self.breakers.get_mut(rule_chain_id) {
                    breaker.record_outcome(success, OffsetDateTime::now_utc());
                }
                let status = if success { "success" } else { "error" };
                if let Err(err) = self.metrics.record_rule_execution(rule_chain_id.as_str(), organization_id.as_str(), status, start.elapsed().as_secs_f64()) {
                    tracing::warn!(error = %err, rule_chain_id = %rule_chain_id, "failed to record rule execution metric");
                }
            }
            Ok(None) => {
                // Chain lookup failed or the chain is gone; already logged,
                // and there is no organization to label the metric with.
            }
            Err(_) => {
                if let Some(mut breaker) = self.breakers.get_mut(rule_chain_id) {
                    breaker.record_outcome(false, OffsetDateTime::now_utc());
                }
                self.note_timeout(rule_chain_id, TimeoutCode::WorkerTimeout);
            }
        }
    }

    /// Looks the chain up, collects its snapshot, executes it, and applies
    /// any emitted actions, each bounded by its own timeout (spec §4.6).
    /// Returns `None` when the chain cannot be resolved at all, in which
    /// case there is no per-chain outcome for the caller to record.
    async fn run_chain_inner(&self, rule_chain_id: &RuleChainId) -> Option<(rule_engine_core::OrganizationId, bool)> {
        let chain = match self.chains.get(rule_chain_id).await {
            Ok(Some(chain)) => chain,
            Ok(None) => {
                tracing::warn!(rule_chain_id = %rule_chain_id, "rule chain not found at invocation time");
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, rule_chain_id = %rule_chain_id, "rule chain lookup failed");
                return None;
            }
        };

        let mut requests = Vec::new();
        for node in &chain.nodes {
            if let NodeConfig::Filter {
                requirement,
            } = &node.config
            {
                collect_leaves(requirement, &mut requests);
            }
        }

        let snapshot = match tokio::time::timeout(std::time::Duration::from_millis(self.timeouts.data_collection_ms), self.collector.collect(&requests)).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                self.note_timeout(rule_chain_id, TimeoutCode::DataCollectionTimeout);
                return Some((chain.organization_id, false));
            }
        };

        // Traversal is CPU-bound and carries no internal suspension point,
        // so it runs on a blocking thread to let the timeout actually race
        // against it rather than against a future that resolves synchronously.
        let max_depth = self.max_depth;
        let chain_for_exec = chain.clone();
        let exec_handle = tokio::task::spawn_blocking(move || execute(&chain_for_exec, snapshot, max_depth, OffsetDateTime::now_utc()));
        let result = match tokio::time::timeout(std::time::Duration::from_millis(self.timeouts.rule_chain_ms), exec_handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                tracing::warn!(error = %join_err, rule_chain_id = %rule_chain_id, "rule chain execution task panicked");
                return Some((chain.organization_id, false));
            }
            Err(_) => {
                self.note_timeout(rule_chain_id, TimeoutCode::RuleChainTimeout);
                return Some((chain.organization_id, false));
            }
        };
        let success = result.status != ExecutionStatus::Error;

        if result.status == ExecutionStatus::Success && !result.actions.is_empty() {
            match tokio::time::timeout(std::time::Duration::from_millis(self.timeouts.external_action_ms), self.bridge.apply_actions(rule_chain_id, &result.actions)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, rule_chain_id = %rule_chain_id, "delivery bridge failed to apply actions");
                    return Some((chain.organization_id, false));
                }
                Err(_) => {
                    self.note_timeout(rule_chain_id, TimeoutCode::ExternalActionTimeout);
                    return Some((chain.organization_id, false));
                }
            }
        }

        Some((chain.organization_id, success))
    }

    /// Logs and counts a timeout raised by a bounded C6 operation (spec
    /// §4.6, §4.11).
    fn note_timeout(&self, rule_chain_id: &RuleChainId, code: TimeoutCode) {
        tracing::warn!(rule_chain_id = %rule_chain_id, code = %code, "operation exceeded its timeout budget");
        if let Err(err) = self.metrics.record_rule_timeout(rule_chain_id.as_str(), code.as_str()) {
            tracing::warn!(error = %err, rule_chain_id = %rule_chain_id, "failed to record rule timeout metric");
        }
    }
}

#[cfg(test)]
mod tests {
    use rule_engine_core::Comparator;
    use rule_engine_core::FilterLeaf;
    use rule_engine_core::OriginatorId;
    use rule_engine_core::OriginatorType;
    use rule_engine_core::SnapshotValue;
    use rule_engine_core::VariableName;

    use super::*;

    #[test]
    fn collects_leaves_through_and_not_group() {
        let leaf_a = FilterLeaf {
            source_type: OriginatorType::Sensor,
            uuid: OriginatorId::new("s1"),
            key: VariableName::new("temperature"),
            op: Comparator::Gt,
            value: SnapshotValue::Number(10.0),
        };
        let leaf_b = FilterLeaf {
            source_type: OriginatorType::Device,
            uuid: OriginatorId::new("d1"),
            key: VariableName::new("power"),
            op: Comparator::Eq,
            value: SnapshotValue::Boolean(true),
        };
        let requirement = Requirement::and(vec![
            Requirement::predicate(leaf_a),
            Requirement::negate(Requirement::require_group(1, vec![Requirement::predicate(leaf_b)])),
        ]);
        let mut out = Vec::new();
        collect_leaves(&requirement, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].uuid, OriginatorId::new("s1"));
        assert_eq!(out[1].uuid, OriginatorId::new("d1"));
    }
}
