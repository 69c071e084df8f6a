// rule-engine-cli/src/error.rs
// ============================================================================
// Module: CLI Error Wrapper
// Description: A single localized error type the command dispatcher returns.
// Purpose: Keep `main` a thin `Result -> ExitCode` mapping, mirroring the
//          teacher's `CliError` wrapper.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// A human-readable CLI failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CliError(pub String);

impl CliError {
    /// Builds a [`CliError`] from anything displayable.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<rule_engine_config::ConfigError> for CliError {
    fn from(err: rule_engine_config::ConfigError) -> Self {
        Self::new(format!("configuration error: {err}"))
    }
}

impl From<rule_engine_cache::CacheError> for CliError {
    fn from(err: rule_engine_cache::CacheError) -> Self {
        Self::new(format!("cache connection error: {err}"))
    }
}

impl From<rule_engine_store_sqlite::StoreError> for CliError {
    fn from(err: rule_engine_store_sqlite::StoreError) -> Self {
        Self::new(format!("store error: {err}"))
    }
}

impl From<rule_engine_metrics::MetricsError> for CliError {
    fn from(err: rule_engine_metrics::MetricsError) -> Self {
        Self::new(format!("metrics registry error: {err}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::new(format!("I/O error: {err}"))
    }
}

/// CLI result alias.
pub type CliResult<T> = Result<T, CliError>;
