//! Binary boot sequence.
//!
//! # Design
//! - Settings are resolved before the factory runs so logging and the alert
//!   relay are live for the whole startup.
//! - The listener address is checked before binding; port zero is rejected.

use std::net::SocketAddr;

use flamaster_config::{DEFAULT_SETTINGS_ENVVAR, Settings, SettingsLoader};
use flamaster_telemetry::{AlertRelay, GlobalContextGuard, LogFormat, LoggingConfig};
use tracing::{error, info};

use crate::builder::AppFactory;
use crate::builtin::{CORE_BLUEPRINT, builtin_blueprints, builtin_extensions};
use crate::error::{AppError, AppResult};

/// Dependencies required to bootstrap the Flamaster application.
pub(crate) struct BootstrapDependencies {
    base: Settings,
    resolved: Settings,
    relay: AlertRelay,
}

impl BootstrapDependencies {
    /// Resolve settings from the environment for the binary entrypoint.
    ///
    /// Settings are resolved once up front so logging can be configured before
    /// the factory runs; the factory repeats the overlay with logging live.
    pub(crate) fn from_env() -> AppResult<Self> {
        let base = base_settings();
        let resolved = SettingsLoader::new(base.clone())
            .envvar(DEFAULT_SETTINGS_ENVVAR)
            .load()
            .map_err(|err| AppError::config("settings.probe", err))?;
        Ok(Self {
            base,
            resolved,
            relay: AlertRelay::new(),
        })
    }
}

/// Entry point for the Flamaster boot sequence.
///
/// # Errors
///
/// Returns an error if settings, logging, or application construction fail, or
/// if the server cannot bind.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;
    run_app_with(dependencies).await
}

/// Boot sequence that relies entirely on injected dependencies.
pub(crate) async fn run_app_with(dependencies: BootstrapDependencies) -> AppResult<()> {
    let BootstrapDependencies {
        base,
        resolved,
        relay,
    } = dependencies;

    flamaster_telemetry::init_logging(&logging_config(&resolved), Some(&relay))
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new(environment_name(&resolved));

    info!("Flamaster application bootstrap starting");

    let app = AppFactory::new(base)
        .extensions(builtin_extensions())
        .blueprints(builtin_blueprints())
        .alert_relay(relay)
        .build()?;

    let addr = app.settings().bind_addr;
    ensure_bindable(addr)?;

    info!(addr = %addr, "Launching HTTP listener");
    let serve_result = app.serve(addr).await;
    if let Err(err) = &serve_result {
        error!(error = %err, "HTTP server stopped with error");
    }
    serve_result?;
    info!("Flamaster application shutdown complete");
    Ok(())
}

/// Reject listener addresses the binary cannot advertise.
pub(crate) fn ensure_bindable(addr: SocketAddr) -> AppResult<()> {
    if addr.port() == 0 {
        return Err(AppError::InvalidConfig {
            field: "BIND_ADDR",
            reason: "zero_port",
            value: Some(addr.to_string()),
        });
    }
    Ok(())
}

/// Settings the binary starts from before the overlay applies.
pub(crate) fn base_settings() -> Settings {
    Settings {
        blueprints: vec![CORE_BLUEPRINT.to_string()],
        ..Settings::default()
    }
}

fn logging_config(settings: &Settings) -> LoggingConfig<'_> {
    LoggingConfig {
        level: &settings.log_level,
        format: LogFormat::from_setting(settings.log_format.as_deref()),
        ..LoggingConfig::default()
    }
}

const fn environment_name(settings: &Settings) -> &'static str {
    if settings.debug { "debug" } else { "production" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_settings_register_core_blueprint() {
        let settings = base_settings();
        assert_eq!(settings.blueprints, vec![CORE_BLUEPRINT.to_string()]);
        assert!(settings.extensions.is_empty());
    }

    #[test]
    fn logging_config_follows_settings() {
        let settings = Settings {
            log_level: "debug".to_string(),
            log_format: Some("json".to_string()),
            ..Settings::default()
        };
        let config = logging_config(&settings);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(environment_name(&settings), "production");
    }

    #[test]
    fn zero_port_is_rejected() {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        assert!(matches!(
            ensure_bindable(addr),
            Err(AppError::InvalidConfig {
                field: "BIND_ADDR",
                reason: "zero_port",
                value: Some(value),
            }) if value == "127.0.0.1:0"
        ));
        assert!(ensure_bindable(SocketAddr::from(([127, 0, 0, 1], 5000))).is_ok());
    }
}
