//! Error types for settings operations.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for settings operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Settings key that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A JSON settings document could not be parsed.
    #[error("failed to parse json settings document")]
    ParseJson {
        /// Document that failed to parse.
        path: PathBuf,
        /// Source serde error.
        source: serde_json::Error,
    },
    /// A YAML settings document could not be parsed.
    #[error("failed to parse yaml settings document")]
    ParseYaml {
        /// Document that failed to parse.
        path: PathBuf,
        /// Source serde error.
        source: serde_yaml::Error,
    },
    /// A settings document was not a key/value mapping at the top level.
    #[error("settings document must be a mapping")]
    NotAMapping {
        /// Document that was rejected.
        path: PathBuf,
    },
    /// Merged settings could not be converted into the typed model.
    #[error("failed to convert settings")]
    Convert {
        /// Operation identifier.
        operation: &'static str,
        /// Source serde error.
        source: serde_json::Error,
    },
}

/// Convenience alias for settings results.
pub type ConfigResult<T> = Result<T, ConfigError>;
