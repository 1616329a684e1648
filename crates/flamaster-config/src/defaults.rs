//! Default values applied when a settings key is absent.
//!
//! # Design
//! - Centralize defaults so the model, loader, and tests agree on them.

/// Environment variable consulted for the secondary settings file.
pub const DEFAULT_SETTINGS_ENVVAR: &str = "PROJECT_SETTINGS";
/// Session key holding an explicit locale override.
pub(crate) const LOCALE_KEY: &str = "locale";
/// Locale used when no accepted language matches.
pub(crate) const DEFAULT_LOCALE: &str = "en";
/// Directory searched for themed templates.
pub(crate) const TEMPLATE_FOLDER: &str = "templates";
/// Cookie carrying the session key.
pub(crate) const SESSION_COOKIE_NAME: &str = "session";
/// Seconds a stored session stays valid after its last save (31 days).
pub(crate) const PERMANENT_SESSION_LIFETIME: u64 = 31 * 24 * 60 * 60;
/// Subject line of error alert mails.
pub(crate) const MAIL_SUBJECT: &str = "[ERROR] flamaster got error";
/// Minimum event level forwarded to the alert mailer.
pub(crate) const MAIL_ALERT_LEVEL: &str = "ERROR";
/// Plain SMTP port used by the alert mailer.
pub(crate) const MAIL_PORT: u16 = 25;
/// Listener address for the binary entrypoint.
pub(crate) const BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 5000);
/// Log filter used when `RUST_LOG` is not provided.
pub(crate) const LOG_LEVEL: &str = "info";
