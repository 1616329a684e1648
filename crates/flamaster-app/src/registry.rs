//! Registration tables resolving `EXTENSIONS` and `BLUEPRINTS` entries.
//!
//! # Design
//! - Entries are keyed by the full dotted path written in settings and
//!   registered explicitly by the binary (or by tests) before building.
//! - Extensions named `security` and `social` receive the user and connection
//!   datastores; every other extension is initialised with the app alone.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use flamaster_config::Settings;
use serde_json::Value;

use crate::context::AppContext;
use crate::error::AppResult;

/// Attribute name of the extension that receives the user datastore.
pub const SECURITY_EXTENSION: &str = "security";
/// Attribute name of the extension that receives the connection datastore.
pub const SOCIAL_EXTENSION: &str = "social";

/// Account storage handed to the `security` extension.
#[async_trait]
pub trait UserDatastore: Send + Sync {
    /// Look up a user by login identifier.
    async fn find_user(&self, identifier: &str) -> Option<Value>;
}

/// Social-login connection storage handed to the `social` extension.
#[async_trait]
pub trait ConnectionDatastore: Send + Sync {
    /// Look up a connection by provider and the provider's user id.
    async fn find_connection(&self, provider: &str, provider_user_id: &str) -> Option<Value>;
}

/// Extra dependency passed to an extension during initialisation.
#[derive(Clone, Default)]
pub enum ExtensionDeps {
    /// No extra argument.
    #[default]
    None,
    /// Shared user datastore.
    Users(Arc<dyn UserDatastore>),
    /// Shared connection datastore.
    Connections(Arc<dyn ConnectionDatastore>),
}

impl fmt::Debug for ExtensionDeps {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::None => "None",
            Self::Users(_) => "Users",
            Self::Connections(_) => "Connections",
        })
    }
}

/// An object bound to the application at startup.
pub trait Extension: Send + Sync {
    /// Attach the extension to the application.
    ///
    /// # Errors
    ///
    /// Returns an error when the extension cannot initialise; startup aborts.
    fn init_app(&self, app: &mut AppContext, deps: ExtensionDeps) -> AppResult<()>;
}

type ExtensionFn = dyn Fn(&mut AppContext) -> AppResult<()> + Send + Sync;

/// A registered extension: an object with `init_app` or a plain callable.
#[derive(Clone)]
pub enum ExtensionEntry {
    /// Object exposing `init_app`.
    Object(Arc<dyn Extension>),
    /// Callable invoked with the application.
    Callable(Arc<ExtensionFn>),
}

/// Table of extensions keyed by dotted path.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    entries: BTreeMap<String, ExtensionEntry>,
}

impl ExtensionRegistry {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object with `init_app` under `path`.
    #[must_use]
    pub fn with<E>(mut self, path: impl Into<String>, extension: E) -> Self
    where
        E: Extension + 'static,
    {
        self.entries
            .insert(path.into(), ExtensionEntry::Object(Arc::new(extension)));
        self
    }

    /// Register a callable taking the application under `path`.
    #[must_use]
    pub fn with_fn<F>(mut self, path: impl Into<String>, callable: F) -> Self
    where
        F: Fn(&mut AppContext) -> AppResult<()> + Send + Sync + 'static,
    {
        self.entries
            .insert(path.into(), ExtensionEntry::Callable(Arc::new(callable)));
        self
    }

    /// Entry registered under `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&ExtensionEntry> {
        self.entries.get(path)
    }

    /// Registered paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ExtensionRegistry")
            .field("paths", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A sub-router merged into the application, optionally under a prefix.
#[derive(Debug, Clone)]
pub struct Blueprint {
    name: String,
    url_prefix: Option<String>,
    router: Router,
}

impl Blueprint {
    /// Blueprint mounted at the root.
    #[must_use]
    pub fn new(name: impl Into<String>, router: Router) -> Self {
        Self {
            name: name.into(),
            url_prefix: None,
            router,
        }
    }

    /// Mount under `prefix` (for example `/account`).
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = Some(prefix.into());
        self
    }

    /// Blueprint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL prefix, when mounted below the root.
    #[must_use]
    pub fn url_prefix(&self) -> Option<&str> {
        self.url_prefix.as_deref()
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>, Router) {
        (self.name, self.url_prefix, self.router)
    }
}

type BlueprintFactory = dyn Fn(&Settings) -> Blueprint + Send + Sync;

/// Table of blueprint factories keyed by dotted path.
#[derive(Clone, Default)]
pub struct BlueprintRegistry {
    entries: BTreeMap<String, Arc<BlueprintFactory>>,
}

impl BlueprintRegistry {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blueprint factory under `path`.
    #[must_use]
    pub fn with<F>(mut self, path: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Settings) -> Blueprint + Send + Sync + 'static,
    {
        self.entries.insert(path.into(), Arc::new(factory));
        self
    }

    /// Build the blueprint registered under `path`.
    #[must_use]
    pub fn resolve(&self, path: &str, settings: &Settings) -> Option<Blueprint> {
        self.entries.get(path).map(|factory| factory(settings))
    }

    /// Registered paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for BlueprintRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BlueprintRegistry")
            .field("paths", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
