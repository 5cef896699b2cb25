//! Process-wide session state.
//!
//! `SessionStore` is a cheap-to-clone handle over a single `watch` channel.
//! The auth gateway publishes into it; everything else reads snapshots or
//! registers listeners. Listeners are held by `SessionSubscription` guards
//! and are released when the guard is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::AuthGateway;
use crate::models::Session;

/// Why the session last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    tx: watch::Sender<SessionState>,
    persist_path: Option<PathBuf>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Store that mirrors every published session to `path` as JSON.
    pub fn with_persistence(path: impl Into<PathBuf>) -> Self {
        Self::build(Some(path.into()))
    }

    fn build(persist_path: Option<PathBuf>) -> Self {
        let (tx, _rx) = watch::channel(SessionState {
            event: AuthEvent::InitialSession,
            session: None,
        });
        Self {
            inner: Arc::new(Inner { tx, persist_path }),
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner.tx.borrow().session.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .tx
            .borrow()
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.tx.borrow().session.is_some()
    }

    /// Raw receiver for async consumers; starts at the current state.
    pub fn changes(&self) -> watch::Receiver<SessionState> {
        self.inner.tx.subscribe()
    }

    /// Replace the session and notify every listener.
    pub fn publish(&self, event: AuthEvent, session: Option<Session>) {
        self.inner.tx.send_modify(|state| self.apply(state, event, session));
    }

    /// Publish only while the store still holds the session issued with
    /// `refresh_token`. Returns false, leaving the state untouched, when it
    /// was signed out or replaced in the meantime.
    pub fn publish_if_current(
        &self,
        refresh_token: &str,
        event: AuthEvent,
        session: Option<Session>,
    ) -> bool {
        self.inner.tx.send_if_modified(|state| {
            let current = state
                .session
                .as_ref()
                .is_some_and(|s| s.refresh_token == refresh_token);
            if !current {
                debug!(?event, "Session changed underneath, dropping update");
                return false;
            }
            self.apply(state, event, session);
            true
        })
    }

    // Runs under the channel's write lock so the file and the state agree.
    fn apply(&self, state: &mut SessionState, event: AuthEvent, session: Option<Session>) {
        if let Some(path) = &self.inner.persist_path {
            persist(path, session.as_ref());
        }
        info!(
            ?event,
            principal = session.as_ref().map(|s| s.principal_id()).unwrap_or("-"),
            "Session changed"
        );
        *state = SessionState { event, session };
    }

    /// Call `callback` on every change published after this point.
    ///
    /// Must be called from within a Tokio runtime. Consecutive changes may
    /// be coalesced; the callback always sees the latest state.
    pub fn on_session_change<F>(&self, mut callback: F) -> SessionSubscription
    where
        F: FnMut(AuthEvent, Option<&Session>) + Send + 'static,
    {
        let mut rx = self.changes();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                callback(state.event, state.session.as_ref());
            }
        });
        SessionSubscription { handle }
    }

    /// Resolve the live session once at startup.
    ///
    /// Uses the in-memory session or the persisted one, refreshing it first
    /// when it is expired or about to be. A session whose refresh token the
    /// backend rejects is dropped; on any other failure the stored session
    /// is kept for the auto-refresh loop to retry.
    pub async fn get_current_session(
        &self,
        auth: &AuthGateway,
        cancel: &CancellationToken,
    ) -> Option<Session> {
        let stored = self.current().or_else(|| self.load_persisted());

        let session = match stored {
            Some(session) if session.expires_within(Utc::now(), auth.refresh_margin()) => {
                info!("Stored session expired or expiring, refreshing");
                match auth.exchange_refresh_token(&session.refresh_token, cancel).await {
                    Ok(fresh) => Some(fresh),
                    Err(e) if e.is_cancelled() => return None,
                    Err(e) if e.is_rejected() => {
                        warn!("Stored session rejected by the backend: {}", e);
                        None
                    }
                    Err(e) => {
                        warn!("Could not refresh stored session, keeping it: {}", e);
                        Some(session)
                    }
                }
            }
            other => other,
        };

        self.publish(AuthEvent::InitialSession, session.clone());
        session
    }

    pub fn load_persisted(&self) -> Option<Session> {
        let path = self.inner.persist_path.as_ref()?;
        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No persisted session at {}", path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read session file {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn persist(path: &Path, session: Option<&Session>) {
    let result = match session {
        Some(session) => serde_json::to_vec_pretty(session)
            .map_err(std::io::Error::from)
            .and_then(|bytes| std::fs::write(path, bytes)),
        None => match std::fs::remove_file(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        },
    };

    if let Err(e) = result {
        warn!("Failed to persist session to {}: {}", path.display(), e);
    }
}

/// Keeps a session listener registered. Dropping it unregisters the listener.
#[must_use = "dropping the subscription unregisters the listener"]
pub struct SessionSubscription {
    handle: JoinHandle<()>,
}

impl SessionSubscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
