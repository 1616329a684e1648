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

//! File-backed settings for the Flamaster application factory.
//!
//! Layout: `model.rs` (typed settings), `loader.rs` (base + environment overlay),
//! `validate.rs` (field checks and dotted-path parsing).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::DEFAULT_SETTINGS_ENVVAR;
pub use error::{ConfigError, ConfigResult};
pub use loader::SettingsLoader;
pub use model::{HeaderPair, Settings};
pub use validate::{DottedPath, validate_settings};
