// rule-engine-core/src/interfaces.rs
// ============================================================================
// Module: Cross-Crate Interfaces
// Description: Backend-agnostic trait seams breaking the C6<->C10<->C9
//              dependency cycle (spec §9 design notes).
// Purpose: Let C6 depend on a delivery bridge trait C10 implements, and C9
//          depend on an enqueuer trait C3 implements, instead of importing
//          each other's concrete managers.
// Dependencies: async-trait (implemented in downstream crates), crate::model
// ============================================================================

//! ## Overview
//! Per spec §9: *"Cyclic references between notification manager, event
//! bus, and rule engine manager"* are broken the same way
//! `decision-gate-core`'s runtime depends on `Dispatcher` rather than a
//! concrete broker: this crate defines the trait, the implementing crate
//! provides a type, and the binary (`rule-engine-cli`) wires concrete
//! instances together once at startup (no singletons, spec §9).
//!
//! Traits here are synchronous where the spec marks a component
//! non-blocking (C2, C5) and `async` (via `async-trait`, which only adds a
//! boxed-future layer and no runtime dependency of its own) everywhere a
//! suspension point is named in spec §5.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::admission::Admission;
use crate::model::ids::OriginatorId;
use crate::model::ids::RuleChainId;
use crate::model::ids::VariableName;
use crate::model::rule_chain::ExecutionType;
use crate::model::rule_chain::RuleChain;

/// Errors an [`OriginatorIndex`] implementation may surface.
///
/// Per spec §4.1: "If the underlying store fails, C1 returns an empty set
/// rather than raising" — this error type exists for the store-backed
/// implementation's own diagnostics; callers in this workspace never see it
/// propagate past the index crate.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An unsupported `sourceType` was requested.
    #[error("invalid source type: {0}")]
    InvalidArgument(String),
    /// The backing cache or store is unreachable.
    #[error("index backend error: {0}")]
    Backend(String),
}

/// C1: maps `(sourceType, originatorId, variableName)` to matching rule
/// chains, with cache coherency against a relational source of truth (spec
/// §4.1).
#[async_trait]
pub trait OriginatorIndex: Send + Sync {
    /// Returns the union of rule-chain ids referencing any of
    /// `variable_names` on `(source_type, originator_id)`.
    ///
    /// # Errors
    ///
    /// Implementations should prefer returning `Ok(empty set)` over an
    /// error on store failure (spec §4.1); this signature still returns a
    /// `Result` so a caller *can* distinguish "no matches" from "lookup
    /// failed" for metrics purposes.
    async fn lookup(
        &self,
        source_type: crate::model::event::OriginatorType,
        originator_id: &OriginatorId,
        variable_names: &[VariableName],
    ) -> Result<Vec<RuleChainId>, IndexError>;

    /// Drops all cache entries for one originator.
    async fn invalidate(&self, source_type: crate::model::event::OriginatorType, originator_id: &OriginatorId);

    /// Drops cache entries for every originator a rule chain references.
    async fn invalidate_by_rule_chain(&self, rule_chain_id: &RuleChainId);

    /// Drops every cached entry, regardless of originator or rule chain.
    /// Called when a `MigrationLog` advance means the rebuild query itself
    /// changed shape, so targeted invalidation by key is not enough (spec §2
    /// `[SUPPLEMENT]`).
    async fn invalidate_all(&self);
}

/// Errors a [`EventEnqueuer`] implementation may surface to its own callers.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The event failed validation before admission was even considered.
    #[error("invalid event: {0}")]
    InvalidArgument(String),
}

/// C3: the event bus/enqueuer. C9 (the schedule manager) depends on this
/// trait instead of importing C3's concrete type, breaking the cycle spec
/// §9 calls out.
#[async_trait]
pub trait EventEnqueuer: Send + Sync {
    /// Validates, filters, gates, and enqueues one event, returning a
    /// tagged [`Admission`] outcome (spec §4.3).
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError`] only for malformed input; backpressure and
    /// no-match outcomes are encoded in the returned `Admission`, not as
    /// errors (spec §9: admission outcomes are a tagged variant, not an
    /// exception).
    async fn emit(
        &self,
        event_type: crate::model::event::EventType,
        payload: serde_json::Value,
        priority: Option<u8>,
    ) -> Result<Admission, EnqueueError>;
}

/// Errors a [`DeliveryBridge`] implementation may surface.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Persisting the device-state instance failed.
    #[error("state persistence failed: {0}")]
    Persistence(String),
}

/// C10: applies committed action commands. C6 (the worker pool) depends on
/// this trait instead of importing C10's concrete type, breaking the cycle
/// spec §9 calls out.
#[async_trait]
pub trait DeliveryBridge: Send + Sync {
    /// Applies one chain's emitted actions: persists device-state
    /// instances, publishes on the pub/sub channel, and fans out to
    /// delivery channels (spec §4.10). Per-channel delivery failures must
    /// not surface here (spec §7: "C10 tolerates per-channel delivery
    /// failure").
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] only when the *persistence* step itself
    /// fails; channel fan-out failures are swallowed internally.
    async fn apply_actions(
        &self,
        rule_chain_id: &RuleChainId,
        actions: &[crate::executor::ActionCommand],
    ) -> Result<(), BridgeError>;
}

/// Errors a [`RuleChainProvider`] implementation may surface.
#[derive(Debug, Error)]
pub enum ChainLookupError {
    /// The backing store is unreachable or returned a corrupt row.
    #[error("rule chain lookup failed: {0}")]
    Backend(String),
}

/// Resolves a rule chain's full definition by id, so C6 can read its nodes
/// without importing a concrete store crate (spec §9 design notes, same
/// seam shape as [`OriginatorIndex`]).
#[async_trait]
pub trait RuleChainProvider: Send + Sync {
    /// Fetches the full rule chain, or `None` if unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ChainLookupError`] on a backend failure.
    async fn get(&self, rule_chain_id: &RuleChainId) -> Result<Option<RuleChain>, ChainLookupError>;
}

/// C5's execution-type lookup, used by [`crate::execution_filter`]. Kept
/// separate from [`OriginatorIndex`] because the filter only ever needs a
/// chain's `ExecutionType`, not its full configuration.
pub trait ExecutionTypeLookup {
    /// Returns the execution type of `rule_chain_id`, or `None` if unknown.
    fn execution_type_of(&self, rule_chain_id: &RuleChainId) -> Option<ExecutionType>;
}
