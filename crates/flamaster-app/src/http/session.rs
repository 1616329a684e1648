//! Cookie-keyed sessions backed by a pluggable store.
//!
//! # Design
//! - `SessionStore` is the seam for distributed backends; the in-process
//!   `MemorySessionStore` is the default and expires entries after
//!   `PERMANENT_SESSION_LIFETIME`.
//! - Handlers see a `Session` handle in request extensions; only modified
//!   sessions are written back.
//! - Store failures degrade to a fresh session and are logged, never surfaced to
//!   the client.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use flamaster_config::Settings;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Session payload as stored by a backend.
pub type SessionData = Map<String, Value>;

/// Errors raised by session backends.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// The backend could not complete the operation.
    #[error("session backend unavailable")]
    Unavailable {
        /// Operation identifier.
        operation: &'static str,
        /// Source backend error.
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Storage behind the session interface; shared by every request worker.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the data stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<SessionData>, SessionStoreError>;
    /// Persist `data` under `key`.
    async fn save(&self, key: &str, data: SessionData) -> Result<(), SessionStoreError>;
    /// Drop the data stored under `key`.
    async fn remove(&self, key: &str) -> Result<(), SessionStoreError>;
}

/// Process-local session store.
///
/// Entries expire `lifetime` after their last save. Expired entries read as
/// missing and are pruned on a later save.
#[derive(Debug)]
pub struct MemorySessionStore {
    inner: RwLock<MemoryInner>,
    lifetime: Duration,
}

#[derive(Debug)]
struct MemoryInner {
    sessions: HashMap<String, StoredSession>,
    last_pruned: Instant,
}

#[derive(Debug)]
struct StoredSession {
    data: SessionData,
    // `None` when the lifetime overflows the clock.
    expires_at: Option<Instant>,
}

impl StoredSession {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_lifetime(Settings::default().session_lifetime())
    }
}

impl MemorySessionStore {
    /// Create an empty store using the default session lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose entries expire `lifetime` after each save.
    #[must_use]
    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                sessions: HashMap::new(),
                last_pruned: Instant::now(),
            }),
            lifetime,
        }
    }

    /// Lifetime applied on every save.
    #[must_use]
    pub const fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Number of stored sessions, including expired ones not yet pruned.
    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Whether no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<SessionData>, SessionStoreError> {
        let now = Instant::now();
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.data.clone()))
    }

    async fn save(&self, key: &str, data: SessionData) -> Result<(), SessionStoreError> {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        if now.duration_since(inner.last_pruned) >= self.lifetime.min(PRUNE_INTERVAL) {
            let before = inner.sessions.len();
            inner.sessions.retain(|_, stored| !stored.is_expired(now));
            inner.last_pruned = now;
            let pruned = before - inner.sessions.len();
            if pruned > 0 {
                debug!(pruned, "expired sessions pruned");
            }
        }
        inner.sessions.insert(
            key.to_string(),
            StoredSession {
                data,
                expires_at: now.checked_add(self.lifetime),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SessionStoreError> {
        self.inner.write().await.sessions.remove(key);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    data: SessionData,
    modified: bool,
}

/// Request-scoped session handle.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    fn from_data(data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                data,
                modified: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().data.get(key).cloned()
    }

    /// String stored under `key`, if the value is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.lock()
            .data
            .get(key)
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    /// Store `value` under `key`.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut inner = self.lock();
        inner.data.insert(key.into(), value.into());
        inner.modified = true;
    }

    /// Remove `key`, returning the previous value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.lock();
        let previous = inner.data.remove(key);
        inner.modified |= previous.is_some();
        previous
    }

    /// Drop every key.
    pub fn clear(&self) {
        let mut inner = self.lock();
        if !inner.data.is_empty() {
            inner.data.clear();
            inner.modified = true;
        }
    }

    /// Whether the session changed during this request.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.lock().modified
    }

    fn snapshot(&self) -> SessionData {
        self.lock().data.clone()
    }
}

/// Shared state of the session middleware.
#[derive(Clone)]
pub(crate) struct SessionLayerState {
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) cookie_name: Arc<str>,
}

pub(crate) async fn session_middleware(
    State(state): State<SessionLayerState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let existing_key = session_key(req.headers(), &state.cookie_name);
    let loaded = match &existing_key {
        Some(key) => load_session(state.store.as_ref(), key).await,
        None => None,
    };
    let key = match (&existing_key, &loaded) {
        (Some(key), Some(_)) => key.clone(),
        _ => new_session_key(),
    };
    let had_data = loaded.is_some();
    let session = Session::from_data(loaded.unwrap_or_default());
    req.extensions_mut().insert(session.clone());

    let mut response = next.run(req).await;

    if session.is_modified() {
        persist_session(&state, &key, session.snapshot(), had_data, &mut response).await;
    }
    response
}

#[instrument(skip_all)]
async fn load_session(store: &dyn SessionStore, key: &str) -> Option<SessionData> {
    match store.load(key).await {
        Ok(data) => data,
        Err(err) => {
            error!(error = %err, "failed to load session; starting fresh");
            None
        }
    }
}

#[instrument(skip_all)]
async fn persist_session(
    state: &SessionLayerState,
    key: &str,
    data: SessionData,
    had_data: bool,
    response: &mut Response,
) {
    if data.is_empty() {
        if had_data {
            if let Err(err) = state.store.remove(key).await {
                error!(error = %err, "failed to remove session");
            }
            append_cookie(response, &state.cookie_name, "", true);
        }
        return;
    }
    match state.store.save(key, data).await {
        Ok(()) => append_cookie(response, &state.cookie_name, key, false),
        Err(err) => error!(error = %err, "failed to save session"),
    }
}

fn session_key(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn new_session_key() -> String {
    Uuid::new_v4().simple().to_string()
}

fn append_cookie(response: &mut Response, name: &str, key: &str, expire: bool) {
    let mut cookie = format!("{name}={key}; HttpOnly; Path=/; SameSite=Lax");
    if expire {
        cookie.push_str("; Max-Age=0");
    }
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(err) => warn!(error = %err, "session cookie is not a valid header value"),
    }
}
