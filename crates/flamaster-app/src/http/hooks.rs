//! Request and response hooks installed around every route.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, header::ACCEPT_LANGUAGE},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Timelike, Utc};
use flamaster_config::Settings;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::http::session::Session;
use crate::i18n::{primary_subtag, resolve_locale};

/// Session key holding the per-session identifier.
pub const SESSION_ID_KEY: &str = "id";

/// Per-request values stamped before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Request start time in UTC, truncated to whole seconds.
    pub now: DateTime<Utc>,
    /// Primary language subtag of the resolved locale.
    pub locale: String,
}

/// Stamp the [`RequestContext`] and make sure the session carries an identifier.
pub(crate) async fn before_request(
    State(settings): State<Arc<Settings>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let session = req.extensions().get::<Session>().cloned();
    let session_override = session
        .as_ref()
        .and_then(|session| session.get_str(&settings.locale_key));
    let accept_language = req
        .headers()
        .get(ACCEPT_LANGUAGE)
        .and_then(|value| value.to_str().ok());
    let locale = resolve_locale(
        accept_language,
        &settings.accept_languages,
        session_override.as_deref(),
        &settings.default_locale,
    );

    let now = Utc::now();
    let context = RequestContext {
        now: now.with_nanosecond(0).unwrap_or(now),
        locale: primary_subtag(&locale).to_string(),
    };
    req.extensions_mut().insert(context);

    if let Some(session) = session {
        ensure_session_id(&session);
    }
    next.run(req).await
}

/// Insert a fresh 32-character lowercase hex identifier when none is present.
pub(crate) fn ensure_session_id(session: &Session) {
    let present = session
        .get(SESSION_ID_KEY)
        .is_some_and(|value| value.as_str().is_some_and(|id| !id.is_empty()));
    if !present {
        session.insert(SESSION_ID_KEY, Uuid::new_v4().simple().to_string());
    }
}

/// Header pairs appended to every response.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResponseHeaders {
    pairs: Arc<[(HeaderName, HeaderValue)]>,
}

impl ResponseHeaders {
    pub(crate) fn from_settings(settings: &Settings) -> AppResult<Self> {
        let pairs = settings
            .headers
            .iter()
            .map(|pair| {
                let name = HeaderName::try_from(pair.name()).map_err(|_| {
                    AppError::InvalidConfig {
                        field: "HEADERS",
                        reason: "invalid_header_name",
                        value: Some(pair.name().to_string()),
                    }
                })?;
                let value = HeaderValue::try_from(pair.value()).map_err(|_| {
                    AppError::InvalidConfig {
                        field: "HEADERS",
                        reason: "invalid_header_value",
                        value: Some(pair.name().to_string()),
                    }
                })?;
                Ok((name, value))
            })
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self {
            pairs: pairs.into(),
        })
    }
}

pub(crate) async fn append_headers(
    State(headers): State<ResponseHeaders>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    let target = response.headers_mut();
    for (name, value) in headers.pairs.iter() {
        target.append(name.clone(), value.clone());
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use flamaster_config::HeaderPair;

    #[test]
    fn ensure_session_id_generates_once() {
        let session = Session::default();
        ensure_session_id(&session);
        let first = session.get_str(SESSION_ID_KEY);
        let Some(first) = first else {
            panic!("session id missing");
        };
        assert_eq!(first.len(), 32);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
        ensure_session_id(&session);
        assert_eq!(session.get_str(SESSION_ID_KEY), Some(first));
    }

    #[test]
    fn response_headers_reject_invalid_names() {
        let settings = Settings {
            headers: vec![HeaderPair("Bad Header".into(), "1".into())],
            ..Settings::default()
        };
        assert!(matches!(
            ResponseHeaders::from_settings(&settings),
            Err(AppError::InvalidConfig {
                reason: "invalid_header_name",
                ..
            })
        ));
    }
}
