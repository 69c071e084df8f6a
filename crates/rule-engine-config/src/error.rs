// rule-engine-config/src/error.rs
// ============================================================================
// Module: Configuration Errors
// Description: Error taxonomy for configuration loading and validation.
// Purpose: Fail closed on malformed or inconsistent configuration.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors raised while loading or validating [`crate::EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(String),
    /// The config file was not valid TOML.
    #[error("failed to parse config file: {0}")]
    Parse(String),
    /// An environment variable override could not be parsed.
    #[error("invalid environment variable {name}: {value}")]
    InvalidEnv {
        /// The offending variable's name.
        name: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
    /// The configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
