//! Base settings plus an optional environment-addressed overlay file.
//!
//! # Design
//! - The base settings are supplied by the caller and always apply.
//! - The overlay path comes from an environment variable; an unset variable or an
//!   unreadable file is skipped without error.
//! - A readable overlay that fails to parse is an error: the operator asked for it.
//! - Top-level overlay keys replace base keys wholesale.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::defaults::DEFAULT_SETTINGS_ENVVAR;
use crate::error::{ConfigError, ConfigResult};
use crate::model::Settings;
use crate::validate::validate_settings;

/// Loads settings from a base value and an optional overlay file.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    base: Settings,
    envvar: Cow<'static, str>,
}

impl SettingsLoader {
    /// Start from the supplied base settings, reading the overlay path from
    /// `PROJECT_SETTINGS`.
    #[must_use]
    pub const fn new(base: Settings) -> Self {
        Self {
            base,
            envvar: Cow::Borrowed(DEFAULT_SETTINGS_ENVVAR),
        }
    }

    /// Read the overlay path from a different environment variable.
    #[must_use]
    pub fn envvar(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.envvar = name.into();
        self
    }

    /// Name of the environment variable consulted for the overlay path.
    #[must_use]
    pub fn envvar_name(&self) -> &str {
        &self.envvar
    }

    /// Resolve the overlay from the environment and produce validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a readable overlay fails to parse or the merged
    /// settings fail validation.
    pub fn load(self) -> ConfigResult<Settings> {
        let overlay = std::env::var_os(self.envvar.as_ref())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        if overlay.is_none() {
            debug!(envvar = %self.envvar, "settings overlay variable unset");
        }
        self.load_with_overlay(overlay.as_deref())
    }

    /// Produce validated settings using an explicit overlay path.
    ///
    /// # Errors
    ///
    /// Returns an error if a readable overlay fails to parse or the merged
    /// settings fail validation.
    pub fn load_with_overlay(self, overlay: Option<&Path>) -> ConfigResult<Settings> {
        let settings = match overlay.map(read_overlay).transpose()?.flatten() {
            Some(document) => merge(&self.base, document)?,
            None => self.base,
        };
        validate_settings(&settings)?;
        Ok(settings)
    }
}

fn read_overlay(path: &Path) -> ConfigResult<Option<Map<String, Value>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(
                path = %path.display(),
                error = %err,
                "settings overlay unreadable; skipping"
            );
            return Ok(None);
        }
    };
    let document = parse_document(path, &raw)?;
    info!(
        path = %path.display(),
        keys = document.len(),
        "applied settings overlay"
    );
    Ok(Some(document))
}

fn parse_document(path: &Path, raw: &str) -> ConfigResult<Map<String, Value>> {
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let value = if is_yaml {
        parse_yaml(path, raw)?
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(json_err) => parse_yaml(path, raw).map_err(|_| ConfigError::ParseJson {
                path: path.to_path_buf(),
                source: json_err,
            })?,
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ConfigError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

fn parse_yaml(path: &Path, raw: &str) -> ConfigResult<Value> {
    serde_yaml::from_str::<Value>(raw).map_err(|source| ConfigError::ParseYaml {
        path: path.to_path_buf(),
        source,
    })
}

fn merge(base: &Settings, overlay: Map<String, Value>) -> ConfigResult<Settings> {
    let mut merged = match serde_json::to_value(base).map_err(|source| ConfigError::Convert {
        operation: "settings.serialize_base",
        source,
    })? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in overlay {
        merged.insert(key, value);
    }
    serde_json::from_value(Value::Object(merged)).map_err(|source| ConfigError::Convert {
        operation: "settings.apply_overlay",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_overlay(suffix: &str, body: &str) -> anyhow::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile()?;
        file.write_all(body.as_bytes())?;
        Ok(file)
    }

    #[test]
    fn missing_overlay_keeps_base() -> anyhow::Result<()> {
        let base = Settings {
            blueprints: vec!["flamaster.core.bp".into()],
            ..Settings::default()
        };
        let loaded = SettingsLoader::new(base.clone())
            .load_with_overlay(Some(Path::new("/definitely/missing/settings.yaml")))?;
        assert_eq!(loaded, base);

        let loaded = SettingsLoader::new(base.clone()).load_with_overlay(None)?;
        assert_eq!(loaded, base);
        Ok(())
    }

    #[test]
    fn yaml_overlay_replaces_top_level_keys() -> anyhow::Result<()> {
        let file = write_overlay(
            ".yaml",
            "ACCEPT_LANGUAGES: [en, fr]\nDEBUG: true\nSTRIPE_KEY: sk_test\n",
        )?;
        let base = Settings {
            blueprints: vec!["flamaster.core.bp".into()],
            accept_languages: vec!["de".into()],
            ..Settings::default()
        };
        let loaded = SettingsLoader::new(base).load_with_overlay(Some(file.path()))?;
        assert_eq!(loaded.accept_languages, vec!["en", "fr"]);
        assert!(loaded.debug);
        assert_eq!(loaded.blueprints, vec!["flamaster.core.bp"]);
        assert_eq!(loaded.get("STRIPE_KEY"), Some(&Value::from("sk_test")));
        Ok(())
    }

    #[test]
    fn json_overlay_is_parsed() -> anyhow::Result<()> {
        let file = write_overlay(".json", r#"{"LOCALE_KEY": "lang"}"#)?;
        let loaded =
            SettingsLoader::new(Settings::default()).load_with_overlay(Some(file.path()))?;
        assert_eq!(loaded.locale_key, "lang");
        Ok(())
    }

    #[test]
    fn malformed_overlay_is_rejected() -> anyhow::Result<()> {
        let file = write_overlay(".json", "[1, 2")?;
        let result = SettingsLoader::new(Settings::default()).load_with_overlay(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::ParseJson { .. })));

        let file = write_overlay(".yaml", "- just\n- a list\n")?;
        let result = SettingsLoader::new(Settings::default()).load_with_overlay(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::NotAMapping { .. })));
        Ok(())
    }

    #[test]
    fn overlay_with_wrong_types_fails_conversion() -> anyhow::Result<()> {
        let file = write_overlay(".yaml", "EXTENSIONS: 5\n")?;
        let result = SettingsLoader::new(Settings::default()).load_with_overlay(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Convert { .. })));
        Ok(())
    }

    #[test]
    fn envvar_name_defaults_and_overrides() {
        let loader = SettingsLoader::new(Settings::default());
        assert_eq!(loader.envvar_name(), "PROJECT_SETTINGS");
        let loader = loader.envvar("SHOP_SETTINGS");
        assert_eq!(loader.envvar_name(), "SHOP_SETTINGS");
    }
}
