//! Client-side navigation gate, the counterpart of the server route gate.
//!
//! Decisions come from the same evaluator the server uses, so a page either
//! blocks on both sides or on neither. The gate resolves the session before
//! evaluating; it never decides against a "not yet checked" state.

use crate::auth::access::{evaluate, Decision};
use crate::auth::redirect::is_root_relative;
use crate::auth::rules::AuthMeta;
use crate::auth::types::AppSession;
use crate::client::store::{FetchOptions, UserSessionStore};
use std::sync::Arc;
use url::form_urlencoded;

/// Gate for client-side route changes.
pub struct PageGate {
    store: Arc<UserSessionStore>,
}

impl PageGate {
    #[must_use]
    pub fn new(store: Arc<UserSessionStore>) -> Self {
        Self { store }
    }

    /// Decide whether the navigation to `requested` may proceed under the
    /// page's requirement, fetching the session first if it was never
    /// resolved in this tab.
    pub async fn check(&self, requested: &str, requirement: Option<&AuthMeta>) -> Decision {
        // public pages skip session work entirely
        let needs_session = requirement.is_some_and(|meta| meta.mode().is_some());
        if !needs_session {
            return Decision::Allow;
        }

        let snapshot = self.store.snapshot();
        let snapshot = if !snapshot.logged_in() && !snapshot.ready {
            self.store.fetch_session(FetchOptions::default()).await
        } else {
            snapshot
        };

        let session = match (snapshot.session, snapshot.user) {
            (Some(session), Some(user)) => Some(AppSession { user, session }),
            _ => None,
        };
        evaluate(
            requirement,
            session.as_ref(),
            requested,
            self.store.config(),
        )
    }

    /// Act on a decision: redirects are navigated, everything else is left
    /// to the caller to render.
    pub fn follow(&self, decision: &Decision) {
        if let Decision::Redirect { location, .. } = decision {
            self.store.navigate_to(location);
        }
    }

    /// Where to land after a completed sign-in: the preserved path from
    /// `query` when it is a safe root-relative target, else the configured
    /// authenticated target.
    #[must_use]
    pub fn post_auth_target(&self, query: &str) -> String {
        let config = self.store.config();
        let query = query.strip_prefix('?').unwrap_or(query);
        let preserved = form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == config.redirect_key())
            .map(|(_, value)| value.into_owned());

        match preserved {
            Some(target) if is_root_relative(&target) => target,
            _ => config.authenticated_redirect().to_string(),
        }
    }
}
