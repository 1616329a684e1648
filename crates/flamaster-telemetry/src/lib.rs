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

//! Telemetry primitives shared across the Flamaster workspace.
//!
//! This crate centralises logging setup and the error alert mailer so the
//! application builder can wire them consistently.

pub mod alerts;
pub mod context;
pub mod error;
pub mod init;

pub use alerts::{
    AlertLayer, AlertRecord, AlertRelay, AlertTransport, MailAlertConfig, SmtpAlertTransport,
    parse_level,
};
pub use context::GlobalContextGuard;
pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
