//! Blueprints shipped with the binary.

use axum::{Extension, Json, Router, routing::get};
use flamaster_config::Settings;
use serde::Serialize;

use crate::http::hooks::RequestContext;
use crate::registry::{Blueprint, BlueprintRegistry, ExtensionRegistry};

/// Dotted path of the built-in `core` blueprint.
pub const CORE_BLUEPRINT: &str = "flamaster.core.bp";

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) locale: String,
}

pub(crate) async fn health(Extension(context): Extension<RequestContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        locale: context.locale,
    })
}

fn core_blueprint(_settings: &Settings) -> Blueprint {
    Blueprint::new("core", Router::new().route("/health", get(health)))
}

/// Blueprints available to every deployment.
#[must_use]
pub fn builtin_blueprints() -> BlueprintRegistry {
    BlueprintRegistry::new().with(CORE_BLUEPRINT, core_blueprint)
}

/// Extensions available to every deployment; none ship by default.
#[must_use]
pub fn builtin_extensions() -> ExtensionRegistry {
    ExtensionRegistry::new()
}
