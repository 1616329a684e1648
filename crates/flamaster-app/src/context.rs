//! Application state while building and after it is servable.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use flamaster_config::Settings;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::templates::Templates;

/// Read-only state reachable from handlers through `Extension<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded settings.
    pub settings: Arc<Settings>,
    /// Themed templates.
    pub templates: Arc<Templates>,
}

/// Mutable view of the application handed to extensions during startup.
#[derive(Debug)]
pub struct AppContext {
    settings: Arc<Settings>,
    templates: Templates,
    router: Router,
    bound: Vec<String>,
}

impl AppContext {
    pub(crate) fn new(settings: Arc<Settings>, templates: Templates) -> Self {
        Self {
            settings,
            templates,
            router: Router::new(),
            bound: Vec::new(),
        }
    }

    /// Loaded settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Template engine, for extensions that add helpers or templates.
    pub fn templates_mut(&mut self) -> &mut Templates {
        &mut self.templates
    }

    /// Merge extension routes into the application.
    pub fn merge(&mut self, router: Router) {
        let current = std::mem::take(&mut self.router);
        self.router = current.merge(router);
    }

    /// Extensions bound so far, in binding order.
    #[must_use]
    pub fn bound_extensions(&self) -> &[String] {
        &self.bound
    }

    pub(crate) fn mark_bound(&mut self, path: &str) {
        self.bound.push(path.to_string());
    }

    /// Nest `router` under `prefix`, or merge it at the root; returns the
    /// normalized prefix actually used.
    pub(crate) fn mount(&mut self, prefix: Option<&str>, router: Router) -> Option<String> {
        let prefix = prefix.and_then(normalize_prefix);
        let current = std::mem::take(&mut self.router);
        self.router = match prefix.as_deref() {
            Some(prefix) => current.nest(prefix, router),
            None => current.merge(router),
        };
        prefix
    }

    pub(crate) fn into_parts(self) -> (Arc<Settings>, Templates, Router, Vec<String>) {
        (self.settings, self.templates, self.router, self.bound)
    }
}

/// `shop/`, `/shop` and `/shop/` all mount at `/shop`; an empty or root prefix
/// mounts at the root.
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}

/// A fully wired application.
#[derive(Debug, Clone)]
pub struct Application {
    pub(crate) router: Router,
    pub(crate) settings: Arc<Settings>,
    pub(crate) extensions: Vec<String>,
    pub(crate) blueprints: Vec<String>,
    pub(crate) alerts_attached: bool,
}

impl Application {
    /// Router with every hook and layer installed.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Loaded settings.
    #[must_use]
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Bound extensions in binding order.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Registered blueprint names in registration order.
    #[must_use]
    pub fn blueprints(&self) -> &[String] {
        &self.blueprints
    }

    /// Whether error alert mails are active.
    #[must_use]
    pub const fn alerts_attached(&self) -> bool {
        self.alerts_attached
    }

    /// Serve until interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn serve(self, addr: SocketAddr) -> AppResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AppError::ServerBind { addr, source })?;
        info!(addr = %addr, "listening");
        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|source| AppError::Serve { source })
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
