// rule-engine-config/src/lib.rs
// ============================================================================
// Module: Rule Engine Configuration
// Description: Environment/file configuration loading and rule chain
//              config validation (spec §6).
// Purpose: Single place the binary and tests construct a validated
//          `EngineConfig` from.
// Dependencies: rule-engine-core, serde, toml
// ============================================================================

//! ## Overview
//! Mirrors `decision-gate-config`'s shape (a `Config` struct with
//! `#[serde(default)]` sub-structs, a `load` entry point, and a `validate`
//! pass) scaled down to the fields spec §6 actually names.

pub mod config;
pub mod error;
pub mod rule_chain;

pub use config::AdmissionConfig;
pub use config::BreakerConfig;
pub use config::CacheConfig;
pub use config::EngineConfig;
pub use config::QueueThresholdsConfig;
pub use config::StoreConfig;
pub use config::TimeoutsConfig;
pub use config::WorkerConfig;
pub use error::ConfigError;
pub use rule_chain::validate_rule_chain;
