//! Application factory.
//!
//! # Design
//! - `AppFactory` runs the startup sequence in a fixed order: settings, alert
//!   mail, extensions, blueprints, hooks, session interface, proxy fix.
//! - Every configured extension and blueprint must resolve; the first miss
//!   aborts the build before anything is served.
//! - Request-time layers are installed once here so blueprints stay plain routers.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router, http::Request, middleware, response::Response};
use flamaster_config::{DEFAULT_SETTINGS_ENVVAR, DottedPath, Settings, SettingsLoader};
use flamaster_telemetry::{
    AlertRelay, AlertTransport, MailAlertConfig, SmtpAlertTransport, TelemetryError, build_sha,
    parse_level,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Span, debug, info, warn};

use crate::context::{AppContext, AppState, Application};
use crate::error::{AppError, AppResult};
use crate::http::errors::{ErrorPages, not_found, panic_response, themed_errors};
use crate::http::hooks::{ResponseHeaders, append_headers, before_request};
use crate::http::proxy::ProxyFixLayer;
use crate::http::session::{
    MemorySessionStore, SessionLayerState, SessionStore, session_middleware,
};
use crate::registry::{
    BlueprintRegistry, ConnectionDatastore, ExtensionDeps, ExtensionEntry, ExtensionRegistry,
    SECURITY_EXTENSION, SOCIAL_EXTENSION, UserDatastore,
};
use crate::templates::Templates;

const HEADER_REQUEST_ID: &str = "x-request-id";

/// Builds a wired [`Application`] from base settings.
pub struct AppFactory {
    settings: Settings,
    envvar: Cow<'static, str>,
    overlay: Option<PathBuf>,
    extensions: ExtensionRegistry,
    blueprints: BlueprintRegistry,
    user_datastore: Option<Arc<dyn UserDatastore>>,
    connection_datastore: Option<Arc<dyn ConnectionDatastore>>,
    session_store: Option<Arc<dyn SessionStore>>,
    alerts: Option<AlertRelay>,
    alert_transport: Option<Arc<dyn AlertTransport>>,
}

impl AppFactory {
    /// Start from `settings`, reading the overlay path from `PROJECT_SETTINGS`.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            envvar: Cow::Borrowed(DEFAULT_SETTINGS_ENVVAR),
            overlay: None,
            extensions: ExtensionRegistry::new(),
            blueprints: BlueprintRegistry::new(),
            user_datastore: None,
            connection_datastore: None,
            session_store: None,
            alerts: None,
            alert_transport: None,
        }
    }

    /// Read the overlay path from a different environment variable.
    #[must_use]
    pub fn envvar(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.envvar = name.into();
        self
    }

    /// Use this overlay file instead of consulting the environment.
    #[must_use]
    pub fn overlay_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.overlay = Some(path.into());
        self
    }

    /// Table used to resolve `EXTENSIONS`.
    #[must_use]
    pub fn extensions(mut self, registry: ExtensionRegistry) -> Self {
        self.extensions = registry;
        self
    }

    /// Table used to resolve `BLUEPRINTS`.
    #[must_use]
    pub fn blueprints(mut self, registry: BlueprintRegistry) -> Self {
        self.blueprints = registry;
        self
    }

    /// Datastore handed to the `security` extension.
    #[must_use]
    pub fn user_datastore(mut self, datastore: Arc<dyn UserDatastore>) -> Self {
        self.user_datastore = Some(datastore);
        self
    }

    /// Datastore handed to the `social` extension.
    #[must_use]
    pub fn connection_datastore(mut self, datastore: Arc<dyn ConnectionDatastore>) -> Self {
        self.connection_datastore = Some(datastore);
        self
    }

    /// Session backend; defaults to [`MemorySessionStore`].
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Relay whose layer is installed in the global subscriber.
    #[must_use]
    pub fn alert_relay(mut self, relay: AlertRelay) -> Self {
        self.alerts = Some(relay);
        self
    }

    /// Deliver alerts through `transport` instead of SMTP.
    #[must_use]
    pub fn alert_transport(mut self, transport: Arc<dyn AlertTransport>) -> Self {
        self.alert_transport = Some(transport);
        self
    }

    /// Run the startup sequence.
    ///
    /// Must run inside a tokio runtime when alert mail is configured.
    ///
    /// # Errors
    ///
    /// Returns an error when settings fail to load, the alert mailer cannot be
    /// configured, an extension or blueprint does not resolve, or an extension
    /// fails to initialise.
    pub fn build(self) -> AppResult<Application> {
        let loader = SettingsLoader::new(self.settings).envvar(self.envvar);
        let settings = match self.overlay.as_deref() {
            Some(path) => loader.load_with_overlay(Some(path)),
            None => loader.load(),
        }
        .map_err(|err| AppError::config("settings.load", err))?;
        let settings = Arc::new(settings);

        let alerts_attached =
            install_alerts(&settings, self.alerts.as_ref(), self.alert_transport)?;

        let templates = Templates::load(&settings.template_folder)?;
        let mut app = AppContext::new(Arc::clone(&settings), templates);

        bind_extensions(
            &mut app,
            &settings,
            &self.extensions,
            self.user_datastore.as_ref(),
            self.connection_datastore.as_ref(),
        )?;
        let blueprints = register_blueprints(&mut app, &settings, &self.blueprints)?;

        let store: Arc<dyn SessionStore> = match self.session_store {
            Some(store) => store,
            None => Arc::new(MemorySessionStore::with_lifetime(
                settings.session_lifetime(),
            )),
        };
        let (settings, templates, router, extensions) = app.into_parts();
        let router = install_hooks(router, &settings, Arc::new(templates), store)?;

        info!(
            extensions = extensions.len(),
            blueprints = blueprints.len(),
            alerts = alerts_attached,
            debug = settings.debug,
            "application built"
        );
        Ok(Application {
            router,
            settings,
            extensions,
            blueprints,
            alerts_attached,
        })
    }
}

fn install_alerts(
    settings: &Settings,
    relay: Option<&AlertRelay>,
    transport: Option<Arc<dyn AlertTransport>>,
) -> AppResult<bool> {
    let Some(server) = settings.mail_server.as_deref() else {
        return Ok(false);
    };
    if settings.debug {
        debug!("debug mode; error alert mail disabled");
        return Ok(false);
    }
    let Some(relay) = relay else {
        warn!("MAIL_SERVER set but no alert relay installed; error alert mail disabled");
        return Ok(false);
    };

    let min_level =
        parse_level(&settings.mail_alert_level).ok_or_else(|| AppError::InvalidConfig {
            field: "MAIL_ALERT_LEVEL",
            reason: "unknown_level",
            value: Some(settings.mail_alert_level.clone()),
        })?;
    let transport = match transport {
        Some(transport) => transport,
        None => {
            let config = MailAlertConfig {
                server: server.to_string(),
                port: settings.mail_port,
                credentials: settings
                    .mail_credentials()
                    .map(|(user, password)| (user.to_string(), password.to_string())),
                sender: settings.default_mail_sender.clone().ok_or_else(|| {
                    AppError::telemetry(
                        "alerts.config",
                        TelemetryError::MailConfigIncomplete {
                            field: "DEFAULT_MAIL_SENDER",
                        },
                    )
                })?,
                recipients: settings.admins.clone(),
            };
            Arc::new(
                SmtpAlertTransport::new(&config)
                    .map_err(|err| AppError::telemetry("alerts.transport", err))?,
            )
        }
    };

    relay
        .attach(transport, settings.mail_subject.clone(), min_level)
        .map_err(|err| AppError::telemetry("alerts.attach", err))?;
    info!(
        server,
        recipients = settings.admins.len(),
        level = %min_level,
        "error alert mail enabled"
    );
    Ok(true)
}

fn bind_extensions(
    app: &mut AppContext,
    settings: &Settings,
    registry: &ExtensionRegistry,
    users: Option<&Arc<dyn UserDatastore>>,
    connections: Option<&Arc<dyn ConnectionDatastore>>,
) -> AppResult<()> {
    for path in &settings.extensions {
        let dotted = DottedPath::parse("EXTENSIONS", path)
            .map_err(|err| AppError::config("extensions.resolve", err))?;
        let entry = registry
            .resolve(dotted.full)
            .ok_or_else(|| AppError::ExtensionLoad { name: path.clone() })?;

        match entry {
            ExtensionEntry::Object(extension) => {
                let deps = match dotted.attribute {
                    SECURITY_EXTENSION => ExtensionDeps::Users(Arc::clone(users.ok_or(
                        AppError::MissingDependency {
                            name: "user_datastore",
                        },
                    )?)),
                    SOCIAL_EXTENSION => ExtensionDeps::Connections(Arc::clone(
                        connections.ok_or(AppError::MissingDependency {
                            name: "connection_datastore",
                        })?,
                    )),
                    _ => ExtensionDeps::None,
                };
                extension.init_app(app, deps)?;
            }
            ExtensionEntry::Callable(callable) => callable(app)?,
        }
        app.mark_bound(path);
        info!(extension = %path, "extension bound");
    }
    Ok(())
}

fn register_blueprints(
    app: &mut AppContext,
    settings: &Settings,
    registry: &BlueprintRegistry,
) -> AppResult<Vec<String>> {
    let mut names: Vec<String> = Vec::with_capacity(settings.blueprints.len());
    for (index, path) in settings.blueprints.iter().enumerate() {
        let dotted = DottedPath::parse("BLUEPRINTS", path)
            .map_err(|err| AppError::config("blueprints.resolve", err))?;
        if settings.blueprints[..index].contains(path) {
            return Err(AppError::BlueprintConflict {
                name: path.clone(),
                reason: "duplicate_path",
            });
        }
        let blueprint =
            registry
                .resolve(dotted.full, settings)
                .ok_or_else(|| AppError::BlueprintLoad {
                    name: dotted.attribute.to_string(),
                })?;
        let (name, prefix, router) = blueprint.into_parts();
        if names.contains(&name) {
            return Err(AppError::BlueprintConflict {
                name,
                reason: "duplicate_name",
            });
        }
        let prefix = app.mount(prefix.as_deref(), router);
        info!(
            blueprint = %name,
            path = %path,
            prefix = prefix.as_deref().unwrap_or("/"),
            "blueprint registered"
        );
        names.push(name);
    }
    Ok(names)
}

fn install_hooks(
    router: Router,
    settings: &Arc<Settings>,
    templates: Arc<Templates>,
    store: Arc<dyn SessionStore>,
) -> AppResult<Router> {
    let headers = ResponseHeaders::from_settings(settings)?;
    let pages = ErrorPages {
        templates: Arc::clone(&templates),
        default_locale: Arc::from(settings.default_locale.as_str()),
    };
    let sessions = SessionLayerState {
        store,
        cookie_name: Arc::from(settings.session_cookie_name.as_str()),
    };
    let state = AppState {
        settings: Arc::clone(settings),
        templates,
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get(HEADER_REQUEST_ID)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("")
                .to_string();
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                route = %request.uri().path(),
                request_id = %request_id,
                build_sha = %build_sha(),
                status_code = tracing::field::Empty,
                latency_ms = tracing::field::Empty
            )
        })
        .on_request(|_request: &Request<_>, _span: &Span| {})
        .on_response(|response: &Response, latency: Duration, span: &Span| {
            span.record("status_code", response.status().as_u16());
            let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
            span.record("latency_ms", latency_ms);
        });
    let request_layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id());

    Ok(router
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(pages, themed_errors))
        .layer(middleware::from_fn_with_state(
            Arc::clone(settings),
            before_request,
        ))
        .layer(middleware::from_fn_with_state(sessions, session_middleware))
        .layer(middleware::from_fn_with_state(headers, append_headers))
        .layer(Extension(state))
        .layer(request_layers)
        .layer(ProxyFixLayer::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{CORE_BLUEPRINT, builtin_blueprints};

    #[test]
    fn unknown_extension_aborts_build() {
        let settings = Settings {
            extensions: vec!["flamaster.extensions.missing".to_string()],
            ..Settings::default()
        };
        let result = AppFactory::new(settings)
            .envvar("FLAMASTER_UNIT_TEST_UNSET_OVERLAY")
            .build();
        assert!(matches!(
            result,
            Err(AppError::ExtensionLoad { name }) if name == "flamaster.extensions.missing"
        ));
    }

    #[test]
    fn security_extension_requires_user_datastore() {
        struct Security;
        impl crate::registry::Extension for Security {
            fn init_app(&self, _app: &mut AppContext, _deps: ExtensionDeps) -> AppResult<()> {
                Ok(())
            }
        }

        let settings = Settings {
            extensions: vec!["flamaster.account.security".to_string()],
            ..Settings::default()
        };
        let result = AppFactory::new(settings)
            .envvar("FLAMASTER_UNIT_TEST_UNSET_OVERLAY")
            .extensions(ExtensionRegistry::new().with("flamaster.account.security", Security))
            .build();
        assert!(matches!(
            result,
            Err(AppError::MissingDependency {
                name: "user_datastore"
            })
        ));
    }

    #[test]
    fn repeated_blueprint_path_is_rejected() {
        let settings = Settings {
            blueprints: vec![CORE_BLUEPRINT.to_string(), CORE_BLUEPRINT.to_string()],
            ..Settings::default()
        };
        let result = AppFactory::new(settings)
            .envvar("FLAMASTER_UNIT_TEST_UNSET_OVERLAY")
            .blueprints(builtin_blueprints())
            .build();
        assert!(matches!(
            result,
            Err(AppError::BlueprintConflict {
                name,
                reason: "duplicate_path",
            }) if name == CORE_BLUEPRINT
        ));
    }

    #[test]
    fn blueprints_sharing_a_name_are_rejected() {
        let settings = Settings {
            blueprints: vec![
                CORE_BLUEPRINT.to_string(),
                "flamaster.mirror.bp".to_string(),
            ],
            ..Settings::default()
        };
        let registry = builtin_blueprints().with("flamaster.mirror.bp", |_settings: &Settings| {
            crate::registry::Blueprint::new("core", Router::new()).with_prefix("/mirror")
        });
        let result = AppFactory::new(settings)
            .envvar("FLAMASTER_UNIT_TEST_UNSET_OVERLAY")
            .blueprints(registry)
            .build();
        assert!(matches!(
            result,
            Err(AppError::BlueprintConflict {
                name,
                reason: "duplicate_name",
            }) if name == "core"
        ));
    }

    #[test]
    fn debug_mode_skips_alerts() -> anyhow::Result<()> {
        let settings = Settings {
            debug: true,
            mail_server: Some("localhost".to_string()),
            ..Settings::default()
        };
        let attached = install_alerts(&settings, Some(&AlertRelay::new()), None)?;
        assert!(!attached);
        Ok(())
    }
}
