//! Typed settings model.
//!
//! # Design
//! - Keys use the `SCREAMING_SNAKE_CASE` names operators put in settings files.
//! - Every field has a default so partial documents deserialize cleanly.
//! - Unknown keys are kept in `extra` for extensions that read their own settings.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::defaults::{
    BIND_ADDR, DEFAULT_LOCALE, LOCALE_KEY, LOG_LEVEL, MAIL_ALERT_LEVEL, MAIL_PORT, MAIL_SUBJECT,
    PERMANENT_SESSION_LIFETIME, SESSION_COOKIE_NAME, TEMPLATE_FOLDER,
};

/// A response header name/value pair, written as `["Name", "value"]` in settings files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPair(pub String, pub String);

impl HeaderPair {
    /// Header name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Header value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.1
    }
}

/// Application settings, immutable once the application is built.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct Settings {
    /// Debug mode; suppresses error alert mails.
    pub debug: bool,
    /// Ordered dotted paths of extensions to bind.
    pub extensions: Vec<String>,
    /// Ordered dotted paths of blueprints to register.
    pub blueprints: Vec<String>,
    /// SMTP relay host for error alerts.
    pub mail_server: Option<String>,
    /// SMTP relay port.
    pub mail_port: u16,
    /// SMTP username.
    pub mail_username: Option<String>,
    /// SMTP password.
    pub mail_password: Option<String>,
    /// Sender mailbox for outgoing mail.
    pub default_mail_sender: Option<String>,
    /// Recipients of error alerts.
    pub admins: Vec<String>,
    /// Subject line of error alerts.
    pub mail_subject: String,
    /// Minimum level (`ERROR`, `WARN`, ...) forwarded to the alert mailer.
    pub mail_alert_level: String,
    /// Headers appended to every response.
    pub headers: Vec<HeaderPair>,
    /// Languages the application can serve, in preference order.
    pub accept_languages: Vec<String>,
    /// Locale used when nothing else matches.
    pub default_locale: String,
    /// Session key holding an explicit locale override.
    pub locale_key: String,
    /// Directory holding themed templates.
    pub template_folder: PathBuf,
    /// Cookie carrying the session key.
    pub session_cookie_name: String,
    /// Seconds a stored session stays valid after its last save.
    pub permanent_session_lifetime: u64,
    /// Listener address used by the binary.
    pub bind_addr: SocketAddr,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format (`json` or `pretty`).
    pub log_format: Option<String>,
    /// Keys not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            extensions: Vec::new(),
            blueprints: Vec::new(),
            mail_server: None,
            mail_port: MAIL_PORT,
            mail_username: None,
            mail_password: None,
            default_mail_sender: None,
            admins: Vec::new(),
            mail_subject: MAIL_SUBJECT.to_string(),
            mail_alert_level: MAIL_ALERT_LEVEL.to_string(),
            headers: Vec::new(),
            accept_languages: vec![DEFAULT_LOCALE.to_string()],
            default_locale: DEFAULT_LOCALE.to_string(),
            locale_key: LOCALE_KEY.to_string(),
            template_folder: PathBuf::from(TEMPLATE_FOLDER),
            session_cookie_name: SESSION_COOKIE_NAME.to_string(),
            permanent_session_lifetime: PERMANENT_SESSION_LIFETIME,
            bind_addr: SocketAddr::from(BIND_ADDR),
            log_level: LOG_LEVEL.to_string(),
            log_format: None,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// SMTP credentials, present only when both username and password are set.
    #[must_use]
    pub fn mail_credentials(&self) -> Option<(&str, &str)> {
        match (self.mail_username.as_deref(), self.mail_password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        }
    }

    /// Lifetime of a stored session.
    #[must_use]
    pub const fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.permanent_session_lifetime)
    }

    /// Look up a key that is not part of the typed model.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Settings")
            .field("debug", &self.debug)
            .field("extensions", &self.extensions)
            .field("blueprints", &self.blueprints)
            .field("mail_server", &self.mail_server)
            .field("mail_port", &self.mail_port)
            .field("mail_username", &self.mail_username)
            .field("mail_password", &self.mail_password.as_ref().map(|_| "***"))
            .field("default_mail_sender", &self.default_mail_sender)
            .field("admins", &self.admins)
            .field("headers", &self.headers)
            .field("accept_languages", &self.accept_languages)
            .field("default_locale", &self.default_locale)
            .field("locale_key", &self.locale_key)
            .field("template_folder", &self.template_folder)
            .field(
                "permanent_session_lifetime",
                &self.permanent_session_lifetime,
            )
            .field("bind_addr", &self.bind_addr)
            .finish_non_exhaustive()
    }
}
