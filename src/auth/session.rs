//! Per-request session resolution with single-flight deduplication.
//!
//! A `SessionCell` rides the request (extensions on the server router, or
//! the identity-keyed registry below when no request object is available).
//! The first caller starts the backend fetch, overlapping callers await the
//! same resolution, and the settled value serves the rest of the request.
//! A failed fetch resolves to "no session"; errors never escape this layer.

use crate::auth::backend::AuthBackend;
use crate::auth::match_user::{matches_user, UserMatch};
use crate::auth::types::AppSession;
use axum::http::HeaderMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

/// Resolved caller identity: `None` is an authoritative "no session".
pub type SessionSnapshot = Option<AppSession>;

type FlightReceiver = watch::Receiver<Option<SessionSnapshot>>;

enum CellState {
    Empty,
    InFlight(FlightReceiver),
    Resolved(SessionSnapshot),
}

enum Waiting {
    Value(SessionSnapshot),
    Shared(FlightReceiver),
}

/// Memo cell scoping session resolution to one request context.
pub struct SessionCell {
    memo: Mutex<CellState>,
    fresh: Mutex<Option<FlightReceiver>>,
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCell {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memo: Mutex::new(CellState::Empty),
            fresh: Mutex::new(None),
        }
    }

    /// Memoized resolution: at most one backend fetch per cell, ever.
    pub async fn load(&self, backend: &dyn AuthBackend, headers: &HeaderMap) -> SessionSnapshot {
        let mut publisher = None;
        let waiting = {
            let mut memo = self.memo.lock().expect("session memo poisoned");
            match &*memo {
                CellState::Resolved(value) => Some(Waiting::Value(value.clone())),
                CellState::InFlight(receiver) => Some(Waiting::Shared(receiver.clone())),
                CellState::Empty => {
                    let (sender, receiver) = watch::channel(None);
                    *memo = CellState::InFlight(receiver);
                    publisher = Some(sender);
                    None
                }
            }
        };
        if let Some(waiting) = waiting {
            return settle(waiting).await;
        }

        let sender = publisher.expect("publisher installed with in-flight state");
        let mut reset = ResetMemo {
            cell: self,
            armed: true,
        };
        let value = resolve(backend, headers).await;
        {
            let mut memo = self.memo.lock().expect("session memo poisoned");
            *memo = CellState::Resolved(value.clone());
        }
        reset.armed = false;
        let _ = sender.send(Some(value.clone()));
        value
    }

    /// Fresh check that does not populate the memo. A resolved or in-flight
    /// memo is reused, and overlapping fresh checks share one fetch, so the
    /// at-most-one-concurrent-fetch guarantee still holds.
    pub async fn load_fresh(
        &self,
        backend: &dyn AuthBackend,
        headers: &HeaderMap,
    ) -> SessionSnapshot {
        let reuse = {
            let memo = self.memo.lock().expect("session memo poisoned");
            match &*memo {
                CellState::Resolved(value) => Some(Waiting::Value(value.clone())),
                CellState::InFlight(receiver) => Some(Waiting::Shared(receiver.clone())),
                CellState::Empty => None,
            }
        };
        if let Some(waiting) = reuse {
            return settle(waiting).await;
        }

        let mut publisher = None;
        let waiting = {
            let mut fresh = self.fresh.lock().expect("fresh flight poisoned");
            match &*fresh {
                Some(receiver) => Some(Waiting::Shared(receiver.clone())),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    *fresh = Some(receiver);
                    publisher = Some(sender);
                    None
                }
            }
        };
        if let Some(waiting) = waiting {
            return settle(waiting).await;
        }

        let sender = publisher.expect("publisher installed with in-flight state");
        let mut reset = ResetFresh {
            cell: self,
            armed: true,
        };
        let value = resolve(backend, headers).await;
        {
            let mut fresh = self.fresh.lock().expect("fresh flight poisoned");
            *fresh = None;
        }
        reset.armed = false;
        let _ = sender.send(Some(value.clone()));
        value
    }

    /// The settled value, if this cell already resolved.
    #[must_use]
    pub fn peek(&self) -> Option<SessionSnapshot> {
        let memo = self.memo.lock().expect("session memo poisoned");
        match &*memo {
            CellState::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }
}

/// Restores `Empty` when a driving future is dropped mid-fetch, so the cell
/// stays usable instead of pinning a dead in-flight marker.
struct ResetMemo<'a> {
    cell: &'a SessionCell,
    armed: bool,
}

impl Drop for ResetMemo<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut memo) = self.cell.memo.lock() {
                if matches!(&*memo, CellState::InFlight(_)) {
                    *memo = CellState::Empty;
                }
            }
        }
    }
}

struct ResetFresh<'a> {
    cell: &'a SessionCell,
    armed: bool,
}

impl Drop for ResetFresh<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut fresh) = self.cell.fresh.lock() {
                *fresh = None;
            }
        }
    }
}

async fn settle(waiting: Waiting) -> SessionSnapshot {
    match waiting {
        Waiting::Value(value) => value,
        Waiting::Shared(mut receiver) => loop {
            let current = receiver.borrow().clone();
            if let Some(value) = current {
                return value;
            }
            // sender dropped without resolving: treat as unauthenticated
            if receiver.changed().await.is_err() {
                return None;
            }
        },
    }
}

async fn resolve(backend: &dyn AuthBackend, headers: &HeaderMap) -> SessionSnapshot {
    match backend.get_session(headers).await {
        Ok(value) => value,
        Err(err) => {
            warn!("session resolution failed, treating as unauthenticated: {err}");
            None
        }
    }
}

/// Refusals from [`require_session`], translated to 401/403 at the boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequireSessionError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Access denied")]
    Forbidden { banned: bool },
}

/// Optional constraints for [`require_session`].
#[derive(Default)]
pub struct RequireSessionOptions {
    pub user: Option<UserMatch>,
}

/// Resolve the memoized session and insist on an authenticated caller.
///
/// # Errors
/// `Unauthenticated` when no session resolves, `Forbidden` for banned users
/// or failed attribute constraints.
pub async fn require_session(
    cell: &SessionCell,
    backend: &dyn AuthBackend,
    headers: &HeaderMap,
    options: &RequireSessionOptions,
) -> Result<AppSession, RequireSessionError> {
    let Some(session) = cell.load(backend, headers).await else {
        return Err(RequireSessionError::Unauthenticated);
    };
    if session.user.is_banned() {
        return Err(RequireSessionError::Forbidden { banned: true });
    }
    if let Some(conditions) = &options.user {
        if !matches_user(&session.user, conditions) {
            return Err(RequireSessionError::Forbidden { banned: false });
        }
    }
    Ok(session)
}

struct RegistryEntry {
    cell: Arc<SessionCell>,
    borrowers: usize,
}

/// Identity-keyed side table for call sites with no request object to hang
/// a cell on. Entries live only while a `ScopedCell` borrows them, so state
/// never leaks across requests that happen to reuse an identity.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, RegistryEntry>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the cell for an opaque request identity, creating it on first
    /// use. Dropping the returned scope releases the borrow.
    #[must_use]
    pub fn scoped(&self, key: &str) -> ScopedCell {
        let cell = {
            let mut inner = self.inner.lock().expect("session registry poisoned");
            let entry = inner.entry(key.to_string()).or_insert_with(|| RegistryEntry {
                cell: Arc::new(SessionCell::new()),
                borrowers: 0,
            });
            entry.borrowers += 1;
            entry.cell.clone()
        };
        ScopedCell {
            registry: self.clone(),
            key: key.to_string(),
            cell,
        }
    }

    fn release(&self, key: &str) {
        let mut inner = self.inner.lock().expect("session registry poisoned");
        if let Some(entry) = inner.get_mut(key) {
            entry.borrowers = entry.borrowers.saturating_sub(1);
            if entry.borrowers == 0 {
                inner.remove(key);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("session registry poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Borrowed registry cell; releases its registry entry on drop.
pub struct ScopedCell {
    registry: SessionRegistry,
    key: String,
    cell: Arc<SessionCell>,
}

impl ScopedCell {
    #[must_use]
    pub fn cell(&self) -> &Arc<SessionCell> {
        &self.cell
    }
}

impl std::ops::Deref for ScopedCell {
    type Target = SessionCell;

    fn deref(&self) -> &Self::Target {
        &self.cell
    }
}

impl Drop for ScopedCell {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{sample_session, ScriptedBackend};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn overlapping_loads_share_one_fetch() {
        let backend = ScriptedBackend::with_session(Some(sample_session("member")));
        backend.session_delay_ms.store(20, Ordering::SeqCst);
        let cell = SessionCell::new();
        let headers = HeaderMap::new();

        let (a, b, c) = tokio::join!(
            cell.load(backend.as_ref(), &headers),
            cell.load(backend.as_ref(), &headers),
            cell.load(backend.as_ref(), &headers),
        );

        assert_eq!(backend.session_calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(a.is_some());
    }

    #[tokio::test]
    async fn resolved_value_serves_the_rest_of_the_request() {
        let backend = ScriptedBackend::with_session(Some(sample_session("member")));
        let cell = SessionCell::new();
        let headers = HeaderMap::new();

        let first = cell.load(backend.as_ref(), &headers).await;
        let second = cell.load(backend.as_ref(), &headers).await;

        assert_eq!(backend.session_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(cell.peek(), Some(first));
    }

    #[tokio::test]
    async fn fetch_failure_resolves_to_no_session() {
        let backend = ScriptedBackend::with_session(None);
        backend.fail_session.store(true, Ordering::SeqCst);
        let cell = SessionCell::new();

        let value = cell.load(backend.as_ref(), &HeaderMap::new()).await;
        assert!(value.is_none());
        // the failure is memoized like any other resolution
        let again = cell.load(backend.as_ref(), &HeaderMap::new()).await;
        assert!(again.is_none());
        assert_eq!(backend.session_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_check_does_not_populate_the_memo() {
        let backend = ScriptedBackend::with_session(Some(sample_session("member")));
        let cell = SessionCell::new();
        let headers = HeaderMap::new();

        let fresh = cell.load_fresh(backend.as_ref(), &headers).await;
        assert!(fresh.is_some());
        assert!(cell.peek().is_none());

        // the memoized path still runs its own fetch afterwards
        let memoized = cell.load(backend.as_ref(), &headers).await;
        assert!(memoized.is_some());
        assert_eq!(backend.session_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn overlapping_fresh_checks_share_one_fetch() {
        let backend = ScriptedBackend::with_session(Some(sample_session("member")));
        backend.session_delay_ms.store(20, Ordering::SeqCst);
        let cell = SessionCell::new();
        let headers = HeaderMap::new();

        let (a, b) = tokio::join!(
            cell.load_fresh(backend.as_ref(), &headers),
            cell.load_fresh(backend.as_ref(), &headers),
        );

        assert_eq!(backend.session_calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn fresh_check_reuses_a_settled_memo() {
        let backend = ScriptedBackend::with_session(Some(sample_session("member")));
        let cell = SessionCell::new();
        let headers = HeaderMap::new();

        let memoized = cell.load(backend.as_ref(), &headers).await;
        let fresh = cell.load_fresh(backend.as_ref(), &headers).await;

        assert_eq!(memoized, fresh);
        assert_eq!(backend.session_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn require_session_enforces_constraints() {
        let backend = ScriptedBackend::with_session(None);
        let cell = SessionCell::new();
        let result =
            require_session(&cell, backend.as_ref(), &HeaderMap::new(), &Default::default()).await;
        assert_eq!(result.unwrap_err(), RequireSessionError::Unauthenticated);

        let backend = ScriptedBackend::with_session(Some(sample_session("member")));
        let cell = SessionCell::new();
        let options = RequireSessionOptions {
            user: Some(serde_json::from_value(json!({"role": "admin"})).unwrap()),
        };
        let result = require_session(&cell, backend.as_ref(), &HeaderMap::new(), &options).await;
        assert_eq!(
            result.unwrap_err(),
            RequireSessionError::Forbidden { banned: false }
        );
    }

    #[tokio::test]
    async fn require_session_rejects_banned_users() {
        let mut session = sample_session("member");
        session
            .user
            .attributes
            .insert("banned".into(), json!(true));
        let backend = ScriptedBackend::with_session(Some(session));
        let cell = SessionCell::new();

        let result =
            require_session(&cell, backend.as_ref(), &HeaderMap::new(), &Default::default()).await;
        assert_eq!(
            result.unwrap_err(),
            RequireSessionError::Forbidden { banned: true }
        );
    }

    #[tokio::test]
    async fn registry_scopes_cells_to_borrowers() {
        let registry = SessionRegistry::new();

        let first = registry.scoped("req-1");
        let second = registry.scoped("req-1");
        assert!(Arc::ptr_eq(first.cell(), second.cell()));
        assert_eq!(registry.len(), 1);

        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());

        // a released identity gets a brand-new cell
        let reused = registry.scoped("req-1");
        let backend = ScriptedBackend::with_session(None);
        let value = reused.load(backend.as_ref(), &HeaderMap::new()).await;
        assert!(value.is_none());
    }
}
