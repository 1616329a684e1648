//! Themed error pages.
//!
//! # Design
//! - Bare 404 and 500 responses (no body) are replaced with the themed
//!   `base.html` and `50x.html` pages; handlers that render their own error
//!   bodies are left alone.
//! - A template that fails to render falls back to the bare status.
//! - Internal errors are logged at `error` so they reach the alert mailer;
//!   panics are logged once by the panic handler.

use std::any::Any;
use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use tera::Context;
use tracing::{debug, error, instrument};

use crate::http::hooks::RequestContext;
use crate::templates::Templates;

/// Template rendered for not-found responses.
pub const NOT_FOUND_TEMPLATE: &str = "base.html";
/// Template rendered for internal errors.
pub const INTERNAL_ERROR_TEMPLATE: &str = "50x.html";

/// Shared state of the error page middleware.
#[derive(Clone)]
pub(crate) struct ErrorPages {
    pub(crate) templates: Arc<Templates>,
    pub(crate) default_locale: Arc<str>,
}

/// Marker set on responses whose failure was already logged.
#[derive(Debug, Clone, Copy)]
struct AlreadyReported;

pub(crate) async fn themed_errors(
    State(pages): State<ErrorPages>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let locale = req
        .extensions()
        .get::<RequestContext>()
        .map_or_else(|| pages.default_locale.to_string(), |ctx| ctx.locale.clone());

    let response = next.run(req).await;
    let status = response.status();
    if !is_bare(&response) {
        return response;
    }

    match status {
        StatusCode::NOT_FOUND => render_page(&pages, NOT_FOUND_TEMPLATE, status, &locale, &path),
        StatusCode::INTERNAL_SERVER_ERROR => {
            if response.extensions().get::<AlreadyReported>().is_none() {
                report_internal_error(&path);
            }
            render_page(&pages, INTERNAL_ERROR_TEMPLATE, status, &locale, &path)
        }
        _ => response,
    }
}

/// Router fallback: a bare 404 that the error page middleware themes.
pub(crate) async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[instrument(skip_all)]
fn report_internal_error(path: &str) {
    error!(path = %path, status = 500, "internal server error");
}

/// Panic handler for `CatchPanicLayer`.
#[instrument(skip_all)]
pub(crate) fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(detail = %detail, "request handler panicked");
    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    response.extensions_mut().insert(AlreadyReported);
    response
}

fn is_bare(response: &Response) -> bool {
    response.headers().get(header::CONTENT_TYPE).is_none()
        && response.body().size_hint().exact() == Some(0)
}

fn render_page(
    pages: &ErrorPages,
    template: &str,
    status: StatusCode,
    locale: &str,
    path: &str,
) -> Response {
    let mut context = Context::new();
    context.insert("status", &status.as_u16());
    context.insert("path", path);
    context.insert("now", &Utc::now().timestamp());
    match pages.templates.render(template, locale, &context) {
        Ok(body) => (status, Html(body)).into_response(),
        Err(err) => {
            debug!(template, error = %err, "themed error page unavailable");
            status.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_reported_500() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<AlreadyReported>().is_some());
        assert!(is_bare(&response));
    }

    #[test]
    fn bodies_with_content_are_not_bare() {
        let response = (StatusCode::NOT_FOUND, "custom").into_response();
        assert!(!is_bare(&response));
    }

    #[test]
    fn failed_render_falls_back_to_bare_status() {
        let pages = ErrorPages {
            templates: Arc::new(Templates::empty()),
            default_locale: Arc::from("en"),
        };
        let response = render_page(&pages, NOT_FOUND_TEMPLATE, StatusCode::NOT_FOUND, "en", "/x");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(is_bare(&response));
    }
}
