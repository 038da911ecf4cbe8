//! Login-redirect construction with requested-path preservation.
//!
//! The preserved value is the full original path and query, percent-encoded
//! into a single query parameter so the user lands back where they started
//! after authenticating. Targets that are not same-origin root-relative
//! paths pass through untouched, and a target that already carries the
//! configured key is never rewritten.

use crate::auth::config::AuthConfig;
use url::form_urlencoded;

/// Structured navigation target for clients that can route without a full
/// page load. `location()` yields the equivalent `Location` header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedirectTarget {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub fragment: Option<String>,
}

impl RedirectTarget {
    /// Parse a raw target into path, decoded query pairs, and fragment.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let (base, fragment) = split_once_keep(raw, '#');
        let (path, query) = split_once_keep(base, '?');
        let query = query
            .map(|raw_query| {
                form_urlencoded::parse(raw_query.as_bytes())
                    .map(|(key, value)| (key.into_owned(), value.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            path: path.to_string(),
            query,
            fragment: fragment.map(ToString::to_string),
        }
    }

    /// Percent-encoded string form, suitable for an HTTP `Location` header.
    #[must_use]
    pub fn location(&self) -> String {
        let mut out = self.path.clone();
        if !self.query.is_empty() {
            out.push('?');
            let encoded: Vec<String> = self
                .query
                .iter()
                .map(|(key, value)| {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                })
                .collect();
            out.push_str(&encoded.join("&"));
        }
        if let Some(fragment) = &self.fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }
}

/// Root-relative and not protocol-relative: exactly one leading `/`.
#[must_use]
pub fn is_root_relative(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//")
}

/// Build the login redirect as a string, preserving `requested` under the
/// configured key. Pass-through cases return `target` byte-identical so an
/// already-encoded query is never re-encoded.
#[must_use]
pub fn preserve_location(target: &str, requested: &str, config: &AuthConfig) -> String {
    if passes_through(target, config) {
        return target.to_string();
    }
    let (base, fragment) = split_once_keep(target, '#');
    let (path, query) = split_once_keep(base, '?');

    let mut out = path.to_string();
    out.push('?');
    if let Some(query) = query {
        if !query.is_empty() {
            out.push_str(query);
            out.push('&');
        }
    }
    out.push_str(&urlencoding::encode(config.redirect_key()));
    out.push('=');
    out.push_str(&urlencoding::encode(requested));
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Structured counterpart of [`preserve_location`], for call sites that
/// navigate with path/query/fragment data instead of a raw string.
#[must_use]
pub fn preserve_target(target: &str, requested: &str, config: &AuthConfig) -> RedirectTarget {
    let mut parsed = RedirectTarget::parse(target);
    if passes_through(target, config) {
        return parsed;
    }
    parsed
        .query
        .push((config.redirect_key().to_string(), requested.to_string()));
    parsed
}

fn passes_through(target: &str, config: &AuthConfig) -> bool {
    if !config.preserve_redirect() || !is_root_relative(target) {
        return true;
    }
    let (base, _) = split_once_keep(target, '#');
    let (_, query) = split_once_keep(base, '?');
    query.is_some_and(|query| {
        form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == config.redirect_key())
    })
}

fn split_once_keep(raw: &str, delimiter: char) -> (&str, Option<&str>) {
    match raw.split_once(delimiter) {
        Some((head, tail)) => (head, Some(tail)),
        None => (raw, None),
    }
}
