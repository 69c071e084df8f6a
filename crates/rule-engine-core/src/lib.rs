// rule-engine-core/src/lib.rs
// ============================================================================
// Module: Rule Engine Core
// Description: Data model, cross-crate interfaces, and the
//              non-I/O-bound components of the event-driven rule engine
//              (C2, C5, C6's breaker, C7).
// Purpose: The shared dependency every other rule-engine-* crate builds on.
// Dependencies: rule-logic, serde, time, thiserror, tracing, dashmap
// ============================================================================

//! ## Overview
//! `rule-engine-core` has no knowledge of Redis, Postgres, or Tokio; it is
//! the pure, synchronous core: the data model (spec §3), the trait seams
//! that the I/O-bound crates implement and depend on (spec §9), and the
//! three components whose contracts are pure functions over in-memory state
//! (C2 Backpressure Gate, C5 Execution-Type Filter, C7 Rule Chain
//! Executor), plus the per-chain circuit breaker state machine C6 drives.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backpressure;
pub mod breaker;
pub mod error;
pub mod execution_filter;
pub mod executor;
pub mod interfaces;
pub mod model;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use backpressure::AdmitOutcome;
pub use backpressure::BackpressureGate;
pub use backpressure::CircuitState;
pub use backpressure::Thresholds;
pub use breaker::Admit;
pub use breaker::BreakerState;
pub use breaker::ChainBreaker;
pub use error::EngineError;
pub use error::RejectedReason;
pub use error::SkippedReason;
pub use error::TimeoutCode;
pub use execution_filter::FilterOutcome;
pub use execution_filter::InvocationKind;
pub use execution_filter::filter_by_execution_type;
pub use executor::ActionCommand;
pub use executor::ExecutionResult;
pub use executor::ExecutionStatus;
pub use executor::NodeResult;
pub use executor::execute;
pub use interfaces::BridgeError;
pub use interfaces::ChainLookupError;
pub use interfaces::DeliveryBridge;
pub use interfaces::EnqueueError;
pub use interfaces::EventEnqueuer;
pub use interfaces::ExecutionTypeLookup;
pub use interfaces::IndexError;
pub use interfaces::OriginatorIndex;
pub use interfaces::RuleChainProvider;
pub use model::*;
