//! Session and user projections exchanged with the wrapped auth backend.
//!
//! The backend owns credential handling and persistence; this layer only
//! caches a read-only projection per request (server) or per page load
//! (client). Integrator-defined fields (role, banned, tier) live in an open
//! attribute bag that the access evaluator matches on without interpreting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Identity projection of the authenticated user.
///
/// Unknown attribute keys are kept verbatim in `attributes` and treated
/// opaquely by the rest of the crate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl AuthUser {
    /// Unified view over built-in fields and the open attribute bag.
    ///
    /// Returns `None` for fields the user simply does not have, so a match
    /// against a missing attribute never succeeds.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(Value::String(self.id.clone())),
            "email" => Some(Value::String(self.email.clone())),
            "name" => self.name.clone().map(Value::String),
            "emailVerified" => Some(Value::Bool(self.email_verified)),
            "image" => self.image.clone().map(Value::String),
            _ => self.attributes.get(key).cloned(),
        }
    }

    /// Whether the integrator flagged this account as banned/suspended.
    #[must_use]
    pub fn is_banned(&self) -> bool {
        matches!(self.attributes.get("banned"), Some(Value::Bool(true)))
    }

    /// Merge a partial update into the projection, used by the client store
    /// for optimistic updates before the backend persist settles.
    pub fn apply(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            match key.as_str() {
                "name" => self.name = value.as_str().map(ToString::to_string),
                "image" => self.image = value.as_str().map(ToString::to_string),
                "email" => {
                    if let Some(email) = value.as_str() {
                        self.email = email.to_string();
                    }
                }
                _ => {
                    self.attributes.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Server-issued session projection, opaque to everything but expiry and
/// client metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `{user, session}` pair the backend resolves for an authenticated
/// caller. `None` at call sites means "no session".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppSession {
    pub user: AuthUser,
    pub session: AuthSession,
}

/// Wire shape for `GET /api/auth/session`.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    #[schema(value_type = Object)]
    pub user: AuthUser,
    #[schema(value_type = Object)]
    pub session: AuthSession,
}

impl From<AppSession> for SessionResponse {
    fn from(app: AppSession) -> Self {
        Self {
            user: app.user,
            session: app.session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_user(role: &str) -> AuthUser {
        serde_json::from_value(json!({
            "id": "usr_1",
            "email": "ana@example.com",
            "name": "Ana",
            "emailVerified": true,
            "role": role,
        }))
        .expect("sample user")
    }

    #[test]
    fn unknown_attributes_survive_round_trip() {
        let user = sample_user("member");
        assert_eq!(
            user.attributes.get("role"),
            Some(&Value::String("member".to_string()))
        );

        let encoded = serde_json::to_value(&user).expect("serialize");
        assert_eq!(encoded["role"], json!("member"));
        assert_eq!(encoded["emailVerified"], json!(true));
    }

    #[test]
    fn field_reads_builtins_and_attributes() {
        let user = sample_user("admin");
        assert_eq!(user.field("email"), Some(json!("ana@example.com")));
        assert_eq!(user.field("role"), Some(json!("admin")));
        assert_eq!(user.field("tier"), None);
    }

    #[test]
    fn banned_requires_explicit_true() {
        let mut user = sample_user("member");
        assert!(!user.is_banned());
        user.attributes.insert("banned".into(), json!("yes"));
        assert!(!user.is_banned());
        user.attributes.insert("banned".into(), json!(true));
        assert!(user.is_banned());
    }

    #[test]
    fn apply_merges_known_fields_and_attributes() {
        let mut user = sample_user("member");
        let patch = json!({"name": "Ana B", "tier": "pro"});
        let Value::Object(patch) = patch else {
            unreachable!()
        };
        user.apply(&patch);
        assert_eq!(user.name.as_deref(), Some("Ana B"));
        assert_eq!(user.attributes.get("tier"), Some(&json!("pro")));
        // untouched fields keep their values
        assert_eq!(user.email, "ana@example.com");
    }
}
