//! Themed templates rendered by the error pages and blueprints.

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use tera::{Context, Tera, Value};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// Template engine loaded from the configured template folder.
#[derive(Debug, Clone)]
pub struct Templates {
    engine: Tera,
}

impl Templates {
    /// Load every `*.html` file below `folder`.
    ///
    /// A missing folder yields an engine without templates, so themed pages fall
    /// back to bare responses.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to parse.
    pub fn load(folder: &Path) -> AppResult<Self> {
        if !folder.is_dir() {
            debug!(folder = %folder.display(), "template folder missing; using empty engine");
            return Ok(Self::empty());
        }
        let pattern = folder.join("**").join("*.html");
        let mut engine = Tera::new(&pattern.to_string_lossy())
            .map_err(|err| AppError::template("templates.load", err))?;
        register_helpers(&mut engine);
        info!(
            folder = %folder.display(),
            templates = engine.get_template_names().count(),
            "templates loaded"
        );
        Ok(Self { engine })
    }

    /// Engine with helpers registered and no templates.
    #[must_use]
    pub fn empty() -> Self {
        let mut engine = Tera::default();
        register_helpers(&mut engine);
        Self { engine }
    }

    /// Add or replace a template from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to parse.
    pub fn add_raw(&mut self, name: &str, content: &str) -> AppResult<()> {
        self.engine
            .add_raw_template(name, content)
            .map_err(|err| AppError::template("templates.add_raw", err))
    }

    /// Whether a template with this name is loaded.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.engine.get_template_names().any(|loaded| loaded == name)
    }

    /// Render a template with a per-request locale added to `context`.
    ///
    /// # Errors
    ///
    /// Returns the engine error when the template is missing or fails to render.
    pub fn render(&self, name: &str, locale: &str, context: &Context) -> tera::Result<String> {
        let mut context = context.clone();
        context.insert("locale", locale);
        self.engine.render(name, &context)
    }

    /// Mutable access for extensions that register their own filters or functions.
    pub fn engine_mut(&mut self) -> &mut Tera {
        &mut self.engine
    }
}

fn register_helpers(engine: &mut Tera) {
    engine.register_function("now", now);
}

fn now(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let now = Utc::now();
    match args.get("format").and_then(Value::as_str) {
        Some(format) => Ok(Value::String(now.format(format).to_string())),
        None => Ok(Value::String(now.to_rfc3339())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_folder_yields_empty_engine() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let templates = Templates::load(&dir.path().join("absent"))?;
        assert!(!templates.contains("base.html"));
        assert!(
            templates
                .render("base.html", "en", &Context::new())
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn nested_templates_load_and_render_locale() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("errors"))?;
        fs::write(dir.path().join("base.html"), "<html lang=\"{{ locale }}\"></html>")?;
        fs::write(dir.path().join("errors/50x.html"), "oops")?;

        let templates = Templates::load(dir.path())?;
        assert!(templates.contains("base.html"));
        assert!(templates.contains("errors/50x.html"));
        assert_eq!(
            templates.render("base.html", "fr", &Context::new())?,
            "<html lang=\"fr\"></html>"
        );
        Ok(())
    }

    #[test]
    fn now_helper_formats_current_time() -> anyhow::Result<()> {
        let mut templates = Templates::empty();
        templates.add_raw("year.html", "{{ now(format=\"%Y\") }}")?;
        let rendered = templates.render("year.html", "en", &Context::new())?;
        assert_eq!(rendered, Utc::now().format("%Y").to_string());
        Ok(())
    }
}
