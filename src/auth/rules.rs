//! Route-rule table mapping path patterns to access requirements.
//!
//! Patterns support `*` (one segment) and `**` (rest of the path). Every
//! pattern matching a request path contributes to the effective requirement:
//! matches are applied least-specific first and merged field by field, so a
//! child rule that only sets `user` does not erase a parent's `redirectTo`.
//! An explicit `false` disables checks outright, including inherited rules.

use crate::auth::match_user::UserMatch;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Who a route admits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Only unauthenticated callers.
    Guest,
    /// Only authenticated callers.
    User,
}

/// Structured requirement. Any unset field inherits from less specific rules.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only: Option<AuthMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserMatch>,
}

/// Requirement attached to a route: disabled outright, or a rule.
///
/// The wire form is `false`, `"guest"`, `"user"`, or a rule object. A bare
/// `true` is tolerated and reads as "authenticated required".
#[derive(Clone, Debug, PartialEq)]
pub enum AuthMeta {
    Disabled,
    Rule(AuthRule),
}

impl AuthMeta {
    /// Effective mode, defaulting to authenticated-required.
    #[must_use]
    pub fn mode(&self) -> Option<AuthMode> {
        match self {
            Self::Disabled => None,
            Self::Rule(rule) => Some(rule.only.unwrap_or(AuthMode::User)),
        }
    }

    #[must_use]
    pub fn rule(&self) -> Option<&AuthRule> {
        match self {
            Self::Disabled => None,
            Self::Rule(rule) => Some(rule),
        }
    }
}

impl From<AuthMode> for AuthMeta {
    fn from(mode: AuthMode) -> Self {
        Self::Rule(AuthRule {
            only: Some(mode),
            ..AuthRule::default()
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuthMetaRepr {
    Flag(bool),
    Mode(AuthMode),
    Rule(AuthRule),
}

impl<'de> Deserialize<'de> for AuthMeta {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match AuthMetaRepr::deserialize(deserializer)? {
            AuthMetaRepr::Flag(false) => Ok(Self::Disabled),
            AuthMetaRepr::Flag(true) => Ok(Self::Rule(AuthRule::default())),
            AuthMetaRepr::Mode(mode) => Ok(Self::from(mode)),
            AuthMetaRepr::Rule(rule) => Ok(Self::Rule(rule)),
        }
    }
}

impl Serialize for AuthMeta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Disabled => serializer.serialize_bool(false),
            Self::Rule(rule) => rule.serialize(serializer),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    CatchAll,
}

/// A parsed path pattern such as `/admin/**` or `/orgs/*/settings`.
#[derive(Clone, Debug)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let segments = split_path(raw)
            .map(|segment| match segment {
                "*" => Segment::Single,
                "**" => Segment::CatchAll,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains no wildcards, so the effective
    /// requirement for it can be precomputed at boot.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = split_path(path).collect();
        let mut index = 0;
        for segment in &self.segments {
            match segment {
                // consumes the rest of the path, including nothing
                Segment::CatchAll => return true,
                Segment::Single => {
                    if index >= path.len() {
                        return false;
                    }
                    index += 1;
                }
                Segment::Literal(literal) => {
                    if path.get(index) != Some(&literal.as_str()) {
                        return false;
                    }
                    index += 1;
                }
            }
        }
        index == path.len()
    }

    /// Ordering key: rules sort ascending so the most specific applies last.
    /// Literal segments outrank wildcards, and a catch-all makes a pattern
    /// less specific than any bounded one of equal prefix.
    fn specificity(&self) -> (usize, usize, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count();
        let bounded = usize::from(!self.segments.contains(&Segment::CatchAll));
        (literals, bounded, self.segments.len())
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

#[derive(Clone, Debug)]
struct RuleEntry {
    pattern: RoutePattern,
    auth: AuthMeta,
}

/// The configured rule table.
#[derive(Clone, Debug, Default)]
pub struct RouteRules {
    entries: Vec<RuleEntry>,
}

impl RouteRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_rule(mut self, pattern: &str, auth: AuthMeta) -> Self {
        self.entries.push(RuleEntry {
            pattern: RoutePattern::parse(pattern),
            auth,
        });
        self
    }

    /// Parse a JSON table of `pattern -> requirement`, e.g.
    /// `{"/admin/**": {"user": {"role": "admin"}}, "/login": "guest"}`.
    ///
    /// # Errors
    /// Returns a `serde_json` error for malformed tables or requirements.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let table: BTreeMap<String, AuthMeta> = serde_json::from_str(raw)?;
        if table.is_empty() {
            return Err(serde_json::Error::custom("route rule table is empty"));
        }
        let mut rules = Self::new();
        for (pattern, auth) in table {
            rules = rules.with_rule(&pattern, auth);
        }
        Ok(rules)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the effective requirement for a concrete path.
    ///
    /// `None` means no rule matched: a public page.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<AuthMeta> {
        let mut matched: Vec<&RuleEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.pattern.matches(path))
            .collect();
        // stable sort keeps table order for equally specific patterns
        matched.sort_by_key(|entry| entry.pattern.specificity());

        let mut resolved: Option<AuthMeta> = None;
        for entry in matched {
            resolved = Some(merge(resolved, &entry.auth));
        }
        resolved
    }

    /// Precompute requirements for the wildcard-free patterns in the table.
    /// Dynamic paths fall back to `resolve` at request time.
    #[must_use]
    pub fn precompute(&self) -> HashMap<String, AuthMeta> {
        self.entries
            .iter()
            .filter(|entry| entry.pattern.is_static())
            .filter_map(|entry| {
                let path = normalize_static(entry.pattern.raw());
                self.resolve(&path).map(|meta| (path, meta))
            })
            .collect()
    }
}

/// Field-by-field override: `next` is more specific than everything merged
/// so far. An explicit `false` wipes inherited rules; a rule following it
/// starts fresh.
fn merge(base: Option<AuthMeta>, next: &AuthMeta) -> AuthMeta {
    match (base, next) {
        (_, AuthMeta::Disabled) => AuthMeta::Disabled,
        (Some(AuthMeta::Rule(base)), AuthMeta::Rule(next)) => AuthMeta::Rule(AuthRule {
            only: next.only.or(base.only),
            redirect_to: next.redirect_to.clone().or(base.redirect_to),
            user: next.user.clone().or(base.user),
        }),
        (_, AuthMeta::Rule(rule)) => AuthMeta::Rule(rule.clone()),
    }
}

fn normalize_static(pattern: &str) -> String {
    let joined: Vec<&str> = split_path(pattern).collect();
    format!("/{}", joined.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(raw: serde_json::Value) -> AuthMeta {
        serde_json::from_value(raw).expect("auth meta")
    }

    #[test]
    fn wire_forms_parse() {
        assert_eq!(meta(json!(false)), AuthMeta::Disabled);
        assert_eq!(meta(json!("guest")).mode(), Some(AuthMode::Guest));
        assert_eq!(meta(json!("user")).mode(), Some(AuthMode::User));
        assert_eq!(meta(json!(true)).mode(), Some(AuthMode::User));

        let rule = meta(json!({"only": "guest", "redirectTo": "/app"}));
        assert_eq!(rule.mode(), Some(AuthMode::Guest));
        assert_eq!(
            rule.rule().and_then(|r| r.redirect_to.as_deref()),
            Some("/app")
        );
    }

    #[test]
    fn patterns_match_segments() {
        assert!(RoutePattern::parse("/admin/**").matches("/admin"));
        assert!(RoutePattern::parse("/admin/**").matches("/admin/users/42"));
        assert!(!RoutePattern::parse("/admin/**").matches("/administrator"));

        assert!(RoutePattern::parse("/orgs/*/settings").matches("/orgs/acme/settings"));
        assert!(!RoutePattern::parse("/orgs/*/settings").matches("/orgs/acme"));
        assert!(!RoutePattern::parse("/orgs/*").matches("/orgs"));

        assert!(RoutePattern::parse("/").matches("/"));
        assert!(!RoutePattern::parse("/app").matches("/app/inner"));
    }

    #[test]
    fn child_rule_keeps_inherited_fields() {
        let rules = RouteRules::new()
            .with_rule(
                "/app/**",
                meta(json!({"redirectTo": "/signin", "user": {"tier": "pro"}})),
            )
            .with_rule("/app/admin/**", meta(json!({"user": {"role": "admin"}})));

        let resolved = rules.resolve("/app/admin/audit").expect("requirement");
        let rule = resolved.rule().expect("rule");
        // the child overrides `user` but inherits `redirectTo`
        assert_eq!(rule.redirect_to.as_deref(), Some("/signin"));
        assert_eq!(
            serde_json::to_value(rule.user.as_ref().expect("match")).unwrap(),
            json!({"role": "admin"})
        );
    }

    #[test]
    fn explicit_false_beats_inherited_rules() {
        let rules = RouteRules::new()
            .with_rule("/app/**", meta(json!("user")))
            .with_rule("/app/public", meta(json!(false)));

        assert_eq!(rules.resolve("/app/public"), Some(AuthMeta::Disabled));
        assert_eq!(rules.resolve("/app/inbox").and_then(|m| m.mode()), Some(AuthMode::User));
    }

    #[test]
    fn most_specific_mode_wins() {
        let rules = RouteRules::new()
            .with_rule("/**", meta(json!("user")))
            .with_rule("/login", meta(json!("guest")));

        assert_eq!(rules.resolve("/login").and_then(|m| m.mode()), Some(AuthMode::Guest));
        assert_eq!(rules.resolve("/inbox").and_then(|m| m.mode()), Some(AuthMode::User));
    }

    #[test]
    fn unmatched_path_is_public() {
        let rules = RouteRules::new().with_rule("/admin/**", meta(json!("user")));
        assert_eq!(rules.resolve("/about"), None);
    }

    #[test]
    fn precompute_covers_static_patterns_only() {
        let rules = RouteRules::new()
            .with_rule("/app/**", meta(json!("user")))
            .with_rule("/login", meta(json!("guest")))
            .with_rule("/app/settings", meta(json!({"user": {"role": "admin"}})));

        let precomputed = rules.precompute();
        assert_eq!(precomputed.len(), 2);
        assert_eq!(precomputed["/login"].mode(), Some(AuthMode::Guest));
        // static lookup agrees with the runtime fallback
        assert_eq!(
            Some(precomputed["/app/settings"].clone()),
            rules.resolve("/app/settings")
        );
    }

    #[test]
    fn from_json_rejects_empty_tables() {
        assert!(RouteRules::from_json("{}").is_err());
        let rules = RouteRules::from_json(r#"{"/admin/**": {"user": {"role": "admin"}}}"#)
            .expect("table");
        assert!(rules.resolve("/admin/users").is_some());
    }
}
