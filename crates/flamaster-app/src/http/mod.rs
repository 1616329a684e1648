//! HTTP layers installed by the application factory.

/// Themed not-found and internal-error pages.
pub mod errors;
/// Pre-request context, session id seeding, and header injection.
pub mod hooks;
/// Reverse-proxy header trust.
pub mod proxy;
/// Session interface and stores.
pub mod session;
