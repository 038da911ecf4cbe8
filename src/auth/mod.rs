//! Core access-control machinery: route rules, per-request session
//! resolution, the decision evaluator, and the backend boundary.
//!
//! Flow Overview: a request path resolves to an [`rules::AuthMeta`]
//! requirement, the [`session::SessionCell`] supplies the caller's identity
//! with single-flight deduplication, and [`access::evaluate`] turns the pair
//! into allow, redirect, or deny. The HTTP and client layers only translate
//! that decision.

pub mod access;
pub mod backend;
pub mod config;
pub mod match_user;
pub mod redirect;
pub mod rules;
pub mod session;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;

pub use access::{evaluate, Decision, DenyReason, RedirectKind};
pub use backend::{AuthBackend, BackendError, HttpAuthBackend};
pub use config::{AuthConfig, ConfigError};
pub use match_user::{matches_user, UserMatch};
pub use rules::{AuthMeta, AuthMode, AuthRule, RouteRules};
pub use session::{
    require_session, RequireSessionError, RequireSessionOptions, SessionCell, SessionRegistry,
};
pub use types::{AppSession, AuthSession, AuthUser};
