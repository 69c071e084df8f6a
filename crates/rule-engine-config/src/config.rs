// rule-engine-config/src/config.rs
// ============================================================================
// Module: Engine Configuration
// Description: Configuration loading and validation for the rule engine core
//              (spec §6 "Environment configuration").
// Purpose: Provide strict config parsing with environment-variable overrides
//          and cross-field validation, failing closed on nonsense values.
// Dependencies: rule-engine-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from an optional TOML file and then overlaid with
//! the environment variables spec §6 names. Every field has a default drawn
//! from the matching core component's own default (C2's [`Thresholds`],
//! C6's [`ChainBreaker`] threshold/recovery timeout), so an engine can start
//! with zero configuration in development.

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use rule_engine_core::ChainBreaker;
use serde::Deserialize;
use time::Duration;

use crate::error::ConfigError;

/// Environment variable used to override the config file path.
pub const CONFIG_ENV_VAR: &str = "RULE_ENGINE_CONFIG";
/// Default configuration filename when no path is specified and the file
/// happens to exist in the working directory.
const DEFAULT_CONFIG_NAME: &str = "rule-engine.toml";
/// Maximum configuration file size, matching the teacher's fail-closed
/// posture on untrusted config inputs.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// C2 backpressure thresholds (spec §4.2, §6).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct QueueThresholdsConfig {
    /// `QUEUE_WARNING_THRESHOLD`.
    pub warning: u64,
    /// `QUEUE_CRITICAL_THRESHOLD`.
    pub critical: u64,
    /// `QUEUE_RECOVERY_THRESHOLD`.
    pub recovery: u64,
}

impl Default for QueueThresholdsConfig {
    fn default() -> Self {
        let defaults = rule_engine_core::Thresholds::default();
        Self {
            warning: defaults.warning,
            critical: defaults.critical,
            recovery: defaults.recovery,
        }
    }
}

/// `ENABLE_BACKPRESSURE` and the default priority assigned to events that
/// omit one.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Whether C2 participates in admission decisions at all.
    pub enable_backpressure: bool,
    /// `DEFAULT_EVENT_PRIORITY`.
    pub default_event_priority: u8,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enable_backpressure: true,
            default_event_priority: 5,
        }
    }
}

/// `RULE_ENGINE_WORKER_CONCURRENCY`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent job executions (spec §5).
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

/// Cache substrate connection parameters (spec §6 "cache connection
/// params").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis-compatible connection URL.
    pub url: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-command timeout in milliseconds.
    pub command_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout_ms: 2_000,
            command_timeout_ms: 1_000,
        }
    }
}

/// Relational store connection parameters (spec §6 "persistent store
/// credentials").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Connection URL; `sqlite:` or `postgres:` scheme selects the backend.
    pub url: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://rule-engine.db".to_string(),
            connect_timeout_ms: 5_000,
            max_connections: 10,
        }
    }
}

/// The timeout codes spec §7 enumerates, all in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// `DATA_COLLECTION_TIMEOUT`.
    pub data_collection_ms: u64,
    /// `RULE_CHAIN_TIMEOUT`.
    pub rule_chain_ms: u64,
    /// `WORKER_TIMEOUT`.
    pub worker_ms: u64,
    /// `EXTERNAL_ACTION_TIMEOUT`.
    pub external_action_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            data_collection_ms: 2_000,
            rule_chain_ms: 5_000,
            worker_ms: 10_000,
            external_action_ms: 5_000,
        }
    }
}

/// Per-chain circuit breaker defaults (spec §4.6, §9 open question).
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before opening.
    pub threshold: u32,
    /// Seconds an opened breaker waits before trialing.
    pub recovery_timeout_secs: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: rule_engine_core::breaker::DEFAULT_THRESHOLD,
            recovery_timeout_secs: rule_engine_core::breaker::DEFAULT_RECOVERY_TIMEOUT.whole_seconds(),
        }
    }
}

impl BreakerConfig {
    /// Builds a fresh [`ChainBreaker`] from this configuration.
    #[must_use]
    pub const fn new_breaker(&self) -> ChainBreaker {
        ChainBreaker::new(self.threshold, Duration::seconds(self.recovery_timeout_secs))
    }
}

/// Top-level engine configuration (spec §6 "Environment configuration").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// C2 queue thresholds.
    pub queue_thresholds: QueueThresholdsConfig,
    /// Admission policy.
    pub admission: AdmissionConfig,
    /// Worker pool sizing.
    pub worker: WorkerConfig,
    /// Cache substrate connection.
    pub cache: CacheConfig,
    /// Relational store connection.
    pub store: StoreConfig,
    /// Timeout budgets.
    pub timeouts: TimeoutsConfig,
    /// Per-chain circuit breaker defaults.
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_thresholds: QueueThresholdsConfig::default(),
            admission: AdmissionConfig::default(),
            worker: WorkerConfig::default(),
            cache: CacheConfig::default(),
            store: StoreConfig::default(),
            timeouts: TimeoutsConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from disk, applies environment overrides, and
    /// validates the result.
    ///
    /// Resolution order: an explicit `path`, then `RULE_ENGINE_CONFIG`, then
    /// `./rule-engine.toml` if it exists, else built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, an
    /// environment override is malformed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path) {
            Some(resolved) => Self::from_file(&resolved)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        toml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Overlays the environment variables named in spec §6 onto this
    /// configuration. Unset variables leave the current value untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when a set variable fails to
    /// parse as its expected type.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_u64("QUEUE_WARNING_THRESHOLD")? {
            self.queue_thresholds.warning = value;
        }
        if let Some(value) = env_u64("QUEUE_CRITICAL_THRESHOLD")? {
            self.queue_thresholds.critical = value;
        }
        if let Some(value) = env_u64("QUEUE_RECOVERY_THRESHOLD")? {
            self.queue_thresholds.recovery = value;
        }
        if let Some(value) = env_bool("ENABLE_BACKPRESSURE")? {
            self.admission.enable_backpressure = value;
        }
        if let Some(value) = env_u8("DEFAULT_EVENT_PRIORITY")? {
            self.admission.default_event_priority = value;
        }
        if let Some(value) = env_usize("RULE_ENGINE_WORKER_CONCURRENCY")? {
            self.worker.concurrency = value;
        }
        if let Ok(value) = env::var("RULE_ENGINE_CACHE_URL") {
            self.cache.url = value;
        }
        if let Ok(value) = env::var("RULE_ENGINE_STORE_URL") {
            self.store.url = value;
        }
        Ok(())
    }

    /// Validates cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when thresholds are out of order,
    /// concurrency is zero, a timeout is zero, or the breaker threshold is
    /// zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.queue_thresholds;
        if !(t.recovery < t.warning && t.warning < t.critical) {
            return Err(ConfigError::Invalid(format!(
                "queue thresholds must satisfy recovery < warning < critical, got {}/{}/{}",
                t.recovery, t.warning, t.critical
            )));
        }
        if self.admission.default_event_priority > 10 {
            return Err(ConfigError::Invalid("default_event_priority must be 0-10".to_string()));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid("worker concurrency must be at least 1".to_string()));
        }
        let timeouts = &self.timeouts;
        if timeouts.data_collection_ms == 0
            || timeouts.rule_chain_ms == 0
            || timeouts.worker_ms == 0
            || timeouts.external_action_ms == 0
        {
            return Err(ConfigError::Invalid("all timeout budgets must be nonzero".to_string()));
        }
        if self.breaker.threshold == 0 {
            return Err(ConfigError::Invalid("breaker threshold must be at least 1".to_string()));
        }
        if self.breaker.recovery_timeout_secs <= 0 {
            return Err(ConfigError::Invalid("breaker recovery_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(from_env) = env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(from_env));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_NAME);
    default.exists().then_some(default)
}

fn env_u64(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

fn env_usize(name: &'static str) -> Result<Option<usize>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

fn env_u8(name: &'static str) -> Result<Option<u8>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.as_str() {
            "1" | "true" | "TRUE" | "True" => Ok(Some(true)),
            "0" | "false" | "FALSE" | "False" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv { name, value }),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn out_of_order_thresholds_are_rejected() {
        let mut config = EngineConfig::default();
        config.queue_thresholds.warning = 100;
        config.queue_thresholds.critical = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = EngineConfig::default();
        config.worker.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_toml_file_and_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nconcurrency = 16\n").unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker.concurrency, 16);
        assert_eq!(config.queue_thresholds.critical, QueueThresholdsConfig::default().critical);
    }
}
