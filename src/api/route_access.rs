//! The server-side access gate, mounted as a layer over the whole router.
//!
//! Every request gets a fresh session cell in its extensions so handlers
//! and the gate share one resolution. Enforcement skips `/api/auth/*` (the
//! backend passthrough must stay reachable to sign in at all). API paths
//! translate decisions to 401/403 JSON; page paths translate them to 302
//! redirects with a percent-encoded `Location`.

use crate::auth::access::{evaluate, Decision, DenyReason, RedirectKind};
use crate::auth::backend::AuthBackend;
use crate::auth::config::AuthConfig;
use crate::auth::rules::{AuthMeta, AuthMode, RouteRules};
use crate::auth::session::{RequireSessionError, SessionCell, SessionRegistry};
use axum::extract::{Request, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared state for the gate and the handlers behind it.
#[derive(Clone)]
pub struct AccessState {
    pub backend: Arc<dyn AuthBackend>,
    pub config: Arc<AuthConfig>,
    pub registry: SessionRegistry,
    rules: Arc<RouteRules>,
    precomputed: Arc<HashMap<String, AuthMeta>>,
}

impl AccessState {
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>, config: Arc<AuthConfig>, rules: RouteRules) -> Self {
        // requirements for wildcard-free patterns are fixed at boot
        let precomputed = rules.precompute();
        Self {
            backend,
            config,
            registry: SessionRegistry::new(),
            rules: Arc::new(rules),
            precomputed: Arc::new(precomputed),
        }
    }

    /// Effective requirement for a path: precomputed when static, resolved
    /// through the rule table otherwise.
    #[must_use]
    pub fn requirement(&self, path: &str) -> Option<AuthMeta> {
        if let Some(meta) = self.precomputed.get(path) {
            return Some(meta.clone());
        }
        self.rules.resolve(path)
    }
}

/// Gate middleware; see the module docs for the translation rules.
pub async fn route_access(
    State(state): State<AccessState>,
    mut request: Request,
    next: Next,
) -> Response {
    // one cell per request; handlers downstream reuse the same resolution
    let cell = Arc::new(SessionCell::new());
    request.extensions_mut().insert(cell.clone());

    let path = request.uri().path().to_string();
    if path.starts_with("/api/auth/") {
        return next.run(request).await;
    }

    let Some(requirement) = state.requirement(&path) else {
        return next.run(request).await;
    };
    let Some(mode) = requirement.mode() else {
        // explicit `false` wins over anything inherited
        return next.run(request).await;
    };

    let requested = request
        .uri()
        .path_and_query()
        .map_or_else(|| path.clone(), |pq| pq.as_str().to_string());

    let session = match mode {
        // a guest rule takes a fresh look so a session created earlier in
        // this request is not masked by the memo
        AuthMode::Guest => {
            cell.load_fresh(state.backend.as_ref(), request.headers())
                .await
        }
        AuthMode::User => cell.load(state.backend.as_ref(), request.headers()).await,
    };

    let decision = evaluate(Some(&requirement), session.as_ref(), &requested, &state.config);
    match decision {
        Decision::Allow => next.run(request).await,
        decision => {
            debug!("access gate blocked {path}: {decision:?}");
            decision_response(&decision, path.starts_with("/api/"))
        }
    }
}

/// Translate a non-allow decision at the HTTP boundary.
#[must_use]
pub fn decision_response(decision: &Decision, api: bool) -> Response {
    match decision {
        Decision::Allow => StatusCode::NO_CONTENT.into_response(),
        Decision::Redirect { kind, location, .. } => {
            if api {
                match kind {
                    RedirectKind::Login => RequireSessionError::Unauthenticated.into_response(),
                    RedirectKind::Guest => (
                        StatusCode::FORBIDDEN,
                        Json(json!({ "error": "Authenticated users not allowed" })),
                    )
                        .into_response(),
                }
            } else {
                redirect_response(location)
            }
        }
        Decision::Deny(reason) => deny_response(reason),
    }
}

fn redirect_response(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(LOCATION, value);
            response
        }
        // a location that cannot be a header is a configuration bug
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn deny_response(reason: &DenyReason) -> Response {
    let status = StatusCode::from_u16(reason.status).unwrap_or(StatusCode::FORBIDDEN);
    let body = if reason.banned {
        json!({ "banned": true })
    } else {
        json!({ "error": "Access denied" })
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for RequireSessionError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Authentication required" })),
            )
                .into_response(),
            Self::Forbidden { banned: true } => {
                (StatusCode::FORBIDDEN, Json(json!({ "banned": true }))).into_response()
            }
            Self::Forbidden { banned: false } => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Access denied" })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::redirect::RedirectTarget;

    #[test]
    fn login_redirects_become_401_on_api_paths() {
        let decision = Decision::Redirect {
            target: RedirectTarget::parse("/login"),
            location: "/login".to_string(),
            kind: RedirectKind::Login,
        };
        assert_eq!(
            decision_response(&decision, true).status(),
            StatusCode::UNAUTHORIZED
        );
        let page = decision_response(&decision, false);
        assert_eq!(page.status(), StatusCode::FOUND);
        assert_eq!(
            page.headers().get(LOCATION).and_then(|v| v.to_str().ok()),
            Some("/login")
        );
    }

    #[test]
    fn banned_denials_carry_the_machine_payload() {
        let response = decision_response(&Decision::Deny(DenyReason::suspended()), true);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
