//! Attribute matching for route rules and `require_session` constraints.
//!
//! Conditions are a conjunction across fields; a list value is a disjunction
//! within that field. Keys are opaque to this crate, the integrator decides
//! what `role` or `tier` mean.

use crate::auth::types::AuthUser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Expected value for a single attribute: one scalar, or any of a list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchValue {
    Any(Vec<Value>),
    One(Value),
}

/// Attribute name to expected value(s), AND across entries.
pub type UserMatch = BTreeMap<String, MatchValue>;

/// Check whether `user` satisfies every condition in `conditions`.
///
/// A field the user does not have matches nothing.
#[must_use]
pub fn matches_user(user: &AuthUser, conditions: &UserMatch) -> bool {
    conditions.iter().all(|(key, expected)| {
        let Some(actual) = user.field(key) else {
            return false;
        };
        match expected {
            MatchValue::Any(options) => options.iter().any(|option| *option == actual),
            MatchValue::One(value) => *value == actual,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(role: &str) -> AuthUser {
        serde_json::from_value(json!({
            "id": "usr_1",
            "email": "ana@example.com",
            "role": role,
            "tier": "free",
        }))
        .expect("user")
    }

    fn conditions(raw: Value) -> UserMatch {
        serde_json::from_value(raw).expect("conditions")
    }

    #[test]
    fn scalar_mismatch_denies() {
        assert!(!matches_user(
            &user("member"),
            &conditions(json!({"role": "admin"}))
        ));
    }

    #[test]
    fn list_is_a_disjunction() {
        let match_owner_or_admin = conditions(json!({"role": ["admin", "owner"]}));
        assert!(matches_user(&user("owner"), &match_owner_or_admin));
        assert!(!matches_user(&user("member"), &match_owner_or_admin));
    }

    #[test]
    fn fields_are_a_conjunction() {
        let both = conditions(json!({"role": "member", "tier": "pro"}));
        assert!(!matches_user(&user("member"), &both));

        let satisfied = conditions(json!({"role": "member", "tier": "free"}));
        assert!(matches_user(&user("member"), &satisfied));
    }

    #[test]
    fn missing_attribute_never_matches() {
        assert!(!matches_user(
            &user("member"),
            &conditions(json!({"plan": "enterprise"}))
        ));
    }

    #[test]
    fn builtin_fields_participate() {
        assert!(matches_user(
            &user("member"),
            &conditions(json!({"email": "ana@example.com"}))
        ));
    }
}
