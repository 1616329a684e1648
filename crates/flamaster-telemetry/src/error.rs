//! Error types for telemetry operations.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A configured mailbox could not be parsed.
    InvalidMailbox {
        /// Settings key holding the mailbox.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Underlying address error.
        source: lettre::address::AddressError,
    },
    /// Alert mail configuration was incomplete.
    MailConfigIncomplete {
        /// Settings key that was missing or empty.
        field: &'static str,
    },
    /// Building an alert message failed.
    MailBuild {
        /// Underlying message builder error.
        source: lettre::error::Error,
    },
    /// Delivering an alert message failed.
    MailSend {
        /// Underlying SMTP error.
        source: lettre::transport::smtp::Error,
    },
    /// The alert worker needs a running tokio runtime.
    NoRuntime,
}

impl Display for TelemetryError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubscriberInstall { .. } => {
                formatter.write_str("failed to install tracing subscriber")
            }
            Self::InvalidMailbox { .. } => formatter.write_str("invalid mailbox in alert settings"),
            Self::MailConfigIncomplete { .. } => {
                formatter.write_str("alert mail settings are incomplete")
            }
            Self::MailBuild { .. } => formatter.write_str("failed to build alert message"),
            Self::MailSend { .. } => formatter.write_str("failed to send alert message"),
            Self::NoRuntime => formatter.write_str("alert worker requires a tokio runtime"),
        }
    }
}

impl Error for TelemetryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SubscriberInstall { source } => Some(source),
            Self::InvalidMailbox { source, .. } => Some(source),
            Self::MailBuild { source } => Some(source),
            Self::MailSend { source } => Some(source),
            Self::MailConfigIncomplete { .. } | Self::NoRuntime => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lettre::Address;

    #[test]
    fn telemetry_error_display_and_source() {
        let Err(address_error) = "not-an-address".parse::<Address>() else {
            panic!("expected address parse failure");
        };
        let invalid = TelemetryError::InvalidMailbox {
            field: "ADMINS",
            value: "not-an-address".to_string(),
            source: address_error,
        };
        assert_eq!(invalid.to_string(), "invalid mailbox in alert settings");
        assert!(invalid.source().is_some());

        let incomplete = TelemetryError::MailConfigIncomplete {
            field: "DEFAULT_MAIL_SENDER",
        };
        assert_eq!(incomplete.to_string(), "alert mail settings are incomplete");
        assert!(incomplete.source().is_none());

        assert_eq!(
            TelemetryError::NoRuntime.to_string(),
            "alert worker requires a tokio runtime"
        );
    }
}
