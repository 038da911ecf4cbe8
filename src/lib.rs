//! # Gardi (Session & Route Access Layer)
//!
//! `gardi` wires a third-party authentication backend into an application's
//! routing, session, and configuration lifecycle. The backend owns
//! credentials and persistence; this crate owns everything between it and
//! the application:
//!
//! ## Route rules
//!
//! A pattern table (`/app/**`, `/orgs/*/settings`) maps paths to access
//! requirements. Matches merge field by field from least to most specific,
//! and an explicit `false` disables checks for a path outright.
//!
//! ## Session resolution
//!
//! Per-request session lookups are memoized and deduplicated: overlapping
//! callers within one request share a single backend fetch. An unreachable
//! backend degrades to "unauthenticated" instead of failing the request.
//!
//! ## Access decisions
//!
//! One evaluator produces allow, redirect, or deny for both page
//! navigations and API calls. Login redirects carry the originally
//! requested path in a query parameter, with protocol-relative and
//! off-origin targets rejected.
//!
//! ## Client state
//!
//! A reactive session store tracks `{session, user, fetching, ready}`
//! across hydration and navigation, and observable action handles wrap
//! sign-in/sign-up flows with last-call-wins race safety.

pub mod api;
pub mod auth;
pub mod cli;
pub mod client;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
