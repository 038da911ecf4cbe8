//! The access evaluator: one decision ladder shared by the page gate and
//! the API gate, so equivalent (requirement, session) pairs always produce
//! equivalent outcomes. Boundaries translate the decision, they never add
//! policy of their own.

use crate::auth::config::AuthConfig;
use crate::auth::match_user::matches_user;
use crate::auth::redirect::{preserve_location, preserve_target, RedirectTarget};
use crate::auth::rules::{AuthMeta, AuthMode};
use crate::auth::types::AppSession;

/// Why a redirect was issued; boundaries map this to 302 vs 401/403.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirectKind {
    /// Authentication required, send to the login target.
    Login,
    /// Guest-only route hit by an authenticated caller.
    Guest,
}

/// Machine-readable refusal for authenticated callers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenyReason {
    pub status: u16,
    pub code: &'static str,
    pub banned: bool,
}

impl DenyReason {
    #[must_use]
    pub fn suspended() -> Self {
        Self {
            status: 403,
            code: "suspended",
            banned: true,
        }
    }

    #[must_use]
    pub fn access_denied() -> Self {
        Self {
            status: 403,
            code: "access_denied",
            banned: false,
        }
    }
}

/// Outcome of evaluating a requirement against the resolved session.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Allow,
    Redirect {
        /// Structured form for client-side navigation.
        target: RedirectTarget,
        /// Percent-encoded form for a `Location` header.
        location: String,
        kind: RedirectKind,
    },
    Deny(DenyReason),
}

impl Decision {
    fn redirect(raw: &str, kind: RedirectKind) -> Self {
        Self::Redirect {
            target: RedirectTarget::parse(raw),
            location: raw.to_string(),
            kind,
        }
    }

    fn login_redirect(raw: &str, requested: &str, config: &AuthConfig) -> Self {
        Self::Redirect {
            target: preserve_target(raw, requested, config),
            location: preserve_location(raw, requested, config),
            kind: RedirectKind::Login,
        }
    }
}

/// Decide access for one request.
///
/// `requested` is the original path and query of the request, used only for
/// redirect preservation on login redirects.
#[must_use]
pub fn evaluate(
    requirement: Option<&AuthMeta>,
    session: Option<&AppSession>,
    requested: &str,
    config: &AuthConfig,
) -> Decision {
    let Some(requirement) = requirement else {
        return Decision::Allow;
    };
    let Some(mode) = requirement.mode() else {
        // explicit `false` short-circuits every check
        return Decision::Allow;
    };
    let rule = requirement.rule();
    let redirect_override = rule.and_then(|rule| rule.redirect_to.as_deref());

    match mode {
        AuthMode::Guest => {
            if session.is_some() {
                let target = redirect_override.unwrap_or_else(|| config.guest_redirect());
                Decision::redirect(target, RedirectKind::Guest)
            } else {
                Decision::Allow
            }
        }
        AuthMode::User => {
            let Some(session) = session else {
                let target = redirect_override.unwrap_or_else(|| config.login_redirect());
                return Decision::login_redirect(target, requested, config);
            };
            if session.user.is_banned() {
                return Decision::Deny(DenyReason::suspended());
            }
            if let Some(conditions) = rule.and_then(|rule| rule.user.as_ref()) {
                if !matches_user(&session.user, conditions) {
                    return Decision::Deny(DenyReason::access_denied());
                }
            }
            Decision::Allow
        }
    }
}
