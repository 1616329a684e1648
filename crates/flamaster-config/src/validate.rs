//! Validation helpers and dotted-path parsing for settings.

use crate::error::{ConfigError, ConfigResult};
use crate::model::Settings;

const LEVELS: &[&str] = &["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR"];

/// A `module.attribute` reference split at its last dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DottedPath<'a> {
    /// Full reference as written in settings.
    pub full: &'a str,
    /// Everything before the last dot.
    pub module: &'a str,
    /// Name after the last dot.
    pub attribute: &'a str,
}

impl<'a> DottedPath<'a> {
    /// Split `value` into module and attribute.
    ///
    /// # Errors
    ///
    /// Returns an error when either side of the last dot is empty.
    pub fn parse(field: &'static str, value: &'a str) -> ConfigResult<Self> {
        let invalid = || ConfigError::InvalidField {
            field,
            value: Some(value.to_string()),
            reason: "not_a_dotted_path",
        };
        let (module, attribute) = value.rsplit_once('.').ok_or_else(invalid)?;
        if module.trim().is_empty() || attribute.trim().is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            full: value,
            module,
            attribute,
        })
    }
}

/// Check settings for values that would otherwise fail at request time.
///
/// # Errors
///
/// Returns the first invalid field encountered.
pub fn validate_settings(settings: &Settings) -> ConfigResult<()> {
    for path in &settings.extensions {
        DottedPath::parse("EXTENSIONS", path)?;
    }
    for path in &settings.blueprints {
        DottedPath::parse("BLUEPRINTS", path)?;
    }
    for header in &settings.headers {
        if !is_token(header.name()) {
            return Err(ConfigError::InvalidField {
                field: "HEADERS",
                value: Some(header.name().to_string()),
                reason: "invalid_header_name",
            });
        }
        if header
            .value()
            .bytes()
            .any(|byte| (byte < 0x20 && byte != b'\t') || byte == 0x7f)
        {
            return Err(ConfigError::InvalidField {
                field: "HEADERS",
                value: Some(header.name().to_string()),
                reason: "invalid_header_value",
            });
        }
    }
    if settings.accept_languages.iter().any(|tag| tag.trim().is_empty()) {
        return Err(ConfigError::InvalidField {
            field: "ACCEPT_LANGUAGES",
            value: None,
            reason: "empty_language_tag",
        });
    }
    if settings.locale_key.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field: "LOCALE_KEY",
            value: None,
            reason: "empty",
        });
    }
    if !is_token(&settings.session_cookie_name) {
        return Err(ConfigError::InvalidField {
            field: "SESSION_COOKIE_NAME",
            value: Some(settings.session_cookie_name.clone()),
            reason: "invalid_cookie_name",
        });
    }
    let level = settings.mail_alert_level.trim();
    if !LEVELS.iter().any(|known| known.eq_ignore_ascii_case(level)) {
        return Err(ConfigError::InvalidField {
            field: "MAIL_ALERT_LEVEL",
            value: Some(settings.mail_alert_level.clone()),
            reason: "unknown_level",
        });
    }
    Ok(())
}

fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.bytes().all(|byte| {
            byte.is_ascii_alphanumeric()
                || matches!(
                    byte,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HeaderPair;

    #[test]
    fn dotted_path_splits_at_last_dot() -> ConfigResult<()> {
        let path = DottedPath::parse("EXTENSIONS", "flamaster.account.security")?;
        assert_eq!(path.module, "flamaster.account");
        assert_eq!(path.attribute, "security");
        assert_eq!(path.full, "flamaster.account.security");
        Ok(())
    }

    #[test]
    fn dotted_path_rejects_bare_names() {
        assert!(DottedPath::parse("BLUEPRINTS", "security").is_err());
        assert!(DottedPath::parse("BLUEPRINTS", "flamaster.").is_err());
        assert!(DottedPath::parse("BLUEPRINTS", ".bp").is_err());
    }

    #[test]
    fn header_names_must_be_tokens() {
        let settings = Settings {
            headers: vec![HeaderPair("Bad Header".into(), "x".into())],
            ..Settings::default()
        };
        let err = validate_settings(&settings);
        assert!(matches!(
            err,
            Err(ConfigError::InvalidField {
                reason: "invalid_header_name",
                ..
            })
        ));
    }

    #[test]
    fn header_values_reject_line_breaks() {
        let settings = Settings {
            headers: vec![HeaderPair("X-Test".into(), "a\r\nb".into())],
            ..Settings::default()
        };
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn alert_level_must_be_known() {
        let mut settings = Settings::default();
        assert!(validate_settings(&settings).is_ok());
        settings.mail_alert_level = "warning".into();
        assert!(validate_settings(&settings).is_ok());
        settings.mail_alert_level = "loud".into();
        assert!(validate_settings(&settings).is_err());
    }
}
