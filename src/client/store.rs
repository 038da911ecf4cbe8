//! Reactive session state for one browser tab or client process.
//!
//! The store tracks `{session, user, fetching, ready}` across bootstrap,
//! navigation, and explicit auth actions. Server-rendered loads hydrate the
//! state directly; prerendered loads defer one reconciling fetch to after
//! mount so hydration output is never contradicted mid-render. Only the
//! most recently started fetch may commit its result.

use crate::auth::backend::{error_payload, AuthBackend};
use crate::auth::config::AuthConfig;
use crate::auth::types::{AppSession, AuthSession, AuthUser};
use crate::client::error::ActionError;
use axum::http::HeaderMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Observable session state.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub session: Option<AuthSession>,
    pub user: Option<AuthUser>,
    pub fetching: bool,
    pub ready: bool,
}

impl SessionState {
    #[must_use]
    pub fn logged_in(&self) -> bool {
        self.session.is_some() && self.user.is_some()
    }
}

/// How the current page load was produced, which decides bootstrap behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Pure client render: fetch immediately.
    ClientRendered,
    /// Server-rendered with state in the payload: no redundant fetch.
    ServerRendered,
    /// Prerendered or cached page: reconcile once after mount.
    Prerendered,
}

/// Options for [`UserSessionStore::fetch_session`].
#[derive(Default)]
pub struct FetchOptions {
    pub headers: Option<HeaderMap>,
    /// Start a new fetch even while one is in flight.
    pub force: bool,
}

/// Options for [`UserSessionStore::sign_out`]. Supplying `on_success`
/// suppresses the store's own logout navigation.
#[derive(Default)]
pub struct SignOutOptions {
    pub on_success: Option<Box<dyn FnOnce(&Value) + Send>>,
}

type NavigateFn = Box<dyn Fn(&str) + Send + Sync>;

/// Tab-wide session store. Single writer (its own methods), any number of
/// watch subscribers.
pub struct UserSessionStore {
    backend: Arc<dyn AuthBackend>,
    config: Arc<AuthConfig>,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    reconcile_pending: AtomicBool,
    reconcile_done: AtomicBool,
    navigate: Option<NavigateFn>,
}

impl UserSessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, config: Arc<AuthConfig>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            config,
            state,
            generation: AtomicU64::new(0),
            reconcile_pending: AtomicBool::new(false),
            reconcile_done: AtomicBool::new(false),
            navigate: None,
        }
    }

    /// Install the navigation primitive used for logout redirects and
    /// followed decisions.
    #[must_use]
    pub fn with_navigator(mut self, navigate: NavigateFn) -> Self {
        self.navigate = Some(navigate);
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn logged_in(&self) -> bool {
        self.state.borrow().logged_in()
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Apply server-rendered state without a fetch.
    pub fn hydrate(&self, session: AuthSession, user: AuthUser) {
        self.state.send_modify(|state| {
            state.session = Some(session);
            state.user = Some(user);
            state.ready = true;
        });
    }

    /// Run the bootstrap step for the given render mode.
    pub async fn bootstrap(&self, mode: RenderMode) {
        match mode {
            RenderMode::ClientRendered => {
                self.fetch_session(FetchOptions::default()).await;
            }
            RenderMode::ServerRendered => {
                if self.config.reverify_hydrated() {
                    self.fetch_session(FetchOptions::default()).await;
                } else {
                    self.state.send_modify(|state| state.ready = true);
                }
            }
            RenderMode::Prerendered => {
                // reconcile after mount; rendering proceeds on hydrated state
                self.reconcile_pending.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Post-mount reconciliation for prerendered pages. Runs at most once
    /// per store lifetime no matter how many call sites schedule it.
    pub async fn reconcile(&self) {
        if !self.reconcile_pending.swap(false, Ordering::SeqCst) {
            return;
        }
        if self.reconcile_done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.fetch_session(FetchOptions::default()).await;
    }

    /// Fetch the session. While a fetch is already in flight, a non-forced
    /// call is a no-op that settles when the in-flight fetch does.
    pub async fn fetch_session(&self, options: FetchOptions) -> SessionState {
        if !options.force {
            let mut receiver = self.state.subscribe();
            if receiver.borrow().fetching {
                while receiver.borrow().fetching {
                    if receiver.changed().await.is_err() {
                        break;
                    }
                }
                return self.snapshot();
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| state.fetching = true);

        let headers = options.headers.unwrap_or_default();
        let value = match self.backend.get_session(&headers).await {
            Ok(value) => value,
            Err(err) => {
                debug!("session fetch failed, clearing state: {err}");
                None
            }
        };

        // a later-started fetch owns the state now; drop this result
        if self.generation.load(Ordering::SeqCst) == generation {
            self.state.send_modify(|state| {
                match value {
                    Some(AppSession { session, user }) => {
                        state.session = Some(session);
                        state.user = Some(user);
                    }
                    None => {
                        state.session = None;
                        state.user = None;
                    }
                }
                state.fetching = false;
                state.ready = true;
            });
        }
        self.snapshot()
    }

    /// Sign out on the backend, then clear local state no matter what came
    /// back. Navigation to the configured logout target happens only when
    /// the caller did not take over with `on_success`.
    pub async fn sign_out(&self, options: SignOutOptions) -> Value {
        let response = match self.backend.sign_out(&HeaderMap::new()).await {
            Ok(value) => value,
            Err(err) => {
                debug!("sign-out call failed: {err}");
                serde_json::json!({ "error": { "message": err.to_string() } })
            }
        };

        self.state.send_modify(|state| {
            state.session = None;
            state.user = None;
            state.ready = true;
        });

        if let Some(on_success) = options.on_success {
            on_success(&response);
        } else if let (Some(navigate), Some(target)) =
            (self.navigate.as_ref(), self.config.logout_redirect())
        {
            navigate(target);
        }
        response
    }

    /// Optimistically merge `patch` into the cached user, persist it, and
    /// roll back to the pre-update value when the backend refuses.
    ///
    /// # Errors
    /// The normalized failure, after local state has been restored.
    pub async fn update_user(&self, patch: Map<String, Value>) -> Result<Value, ActionError> {
        let previous = self.state.borrow().user.clone();
        let Some(previous) = previous else {
            return Err(ActionError::normalize(Value::String(
                "no authenticated user to update".to_string(),
            )));
        };

        self.state.send_modify(|state| {
            if let Some(user) = state.user.as_mut() {
                user.apply(&patch);
            }
        });

        let rollback = |this: &Self| {
            this.state
                .send_modify(|state| state.user = Some(previous.clone()));
        };

        match self.backend.update_user(Value::Object(patch), &HeaderMap::new()).await {
            Ok(value) => {
                if let Some(error) = error_payload(&value) {
                    let error = ActionError::normalize(error.clone());
                    rollback(self);
                    Err(error)
                } else {
                    Ok(value)
                }
            }
            Err(err) => {
                rollback(self);
                Err(ActionError::from_backend(&err))
            }
        }
    }

    /// Navigate via the installed primitive; a no-op without one.
    pub fn navigate_to(&self, target: &str) {
        if let Some(navigate) = self.navigate.as_ref() {
            navigate(target);
        }
    }
}
