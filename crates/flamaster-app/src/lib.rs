#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Flamaster application factory.
//!
//! Layout: `builder.rs` (startup sequence), `registry.rs` (extension and
//! blueprint tables), `http/` (hooks, error pages, sessions, proxy fix),
//! `bootstrap.rs` (binary wiring).

/// Binary wiring: logging, settings, and the listener.
pub mod bootstrap;
/// Application factory.
pub mod builder;
/// Blueprints shipped with the binary.
pub mod builtin;
/// Build-time and servable application state.
pub mod context;
/// Application error types.
pub mod error;
/// HTTP layers installed by the factory.
pub mod http;
/// Locale resolution.
pub mod i18n;
/// Registration tables for extensions and blueprints.
pub mod registry;
/// Themed template engine.
pub mod templates;

pub use bootstrap::run_app;
pub use builder::AppFactory;
pub use builtin::{CORE_BLUEPRINT, builtin_blueprints, builtin_extensions};
pub use context::{AppContext, AppState, Application};
pub use error::{AppError, AppResult};
pub use http::hooks::{RequestContext, SESSION_ID_KEY};
pub use http::proxy::{ClientInfo, ProxyFixLayer};
pub use http::session::{
    MemorySessionStore, Session, SessionData, SessionStore, SessionStoreError,
};
pub use i18n::resolve_locale;
pub use registry::{
    Blueprint, BlueprintRegistry, ConnectionDatastore, Extension, ExtensionDeps, ExtensionEntry,
    ExtensionRegistry, UserDatastore,
};
pub use templates::Templates;
