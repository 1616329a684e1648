//! Error types for the application factory and binary.
//!
//! # Design
//!
//! - Centralize application-level errors for the factory and the binary.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// A configured extension path has no registered extension.
    #[error("extension not found")]
    ExtensionLoad {
        /// Dotted path as written in `EXTENSIONS`.
        name: String,
    },
    /// A configured blueprint path has no registered blueprint.
    #[error("blueprint not found")]
    BlueprintLoad {
        /// Attribute name of the missing blueprint.
        name: String,
    },
    /// A blueprint would be registered twice.
    #[error("blueprint registered twice")]
    BlueprintConflict {
        /// Dotted path or blueprint name that repeats.
        name: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// An extension rejected initialisation.
    #[error("extension initialisation failed")]
    ExtensionInit {
        /// Dotted path of the extension.
        name: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Required dependency was missing.
    #[error("missing dependency")]
    MissingDependency {
        /// Name of the missing dependency.
        name: &'static str,
    },
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: flamaster_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: flamaster_telemetry::TelemetryError,
    },
    /// Template loading or rendering failed.
    #[error("template operation failed")]
    Template {
        /// Operation identifier.
        operation: &'static str,
        /// Source template error.
        source: tera::Error,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
    /// Binding the HTTP listener failed.
    #[error("failed to bind listener")]
    ServerBind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Source IO error.
        source: io::Error,
    },
    /// The HTTP server stopped with an error.
    #[error("http server failed")]
    Serve {
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: flamaster_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: flamaster_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn template(operation: &'static str, source: tera::Error) -> Self {
        Self::Template { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "settings.load",
            flamaster_config::ConfigError::InvalidField {
                field: "EXTENSIONS",
                value: Some("broken".to_string()),
                reason: "not_a_dotted_path",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert!(config.source().is_some());

        let telemetry = AppError::telemetry(
            "alerts.attach",
            flamaster_telemetry::TelemetryError::NoRuntime,
        );
        assert_eq!(telemetry.to_string(), "telemetry operation failed");

        let template = AppError::template("templates.load", tera::Error::msg("bad glob"));
        assert!(matches!(template, AppError::Template { .. }));
    }

    #[test]
    fn load_errors_keep_constant_messages() {
        let extension = AppError::ExtensionLoad {
            name: "flamaster.extensions.mail".to_string(),
        };
        assert_eq!(extension.to_string(), "extension not found");
        let blueprint = AppError::BlueprintLoad {
            name: "bp".to_string(),
        };
        assert_eq!(blueprint.to_string(), "blueprint not found");
        let conflict = AppError::BlueprintConflict {
            name: "core".to_string(),
            reason: "duplicate_name",
        };
        assert_eq!(conflict.to_string(), "blueprint registered twice");
    }
}
