//! Normalization of auth operation failures into one shape the UI can show.

use crate::auth::backend::BackendError;
use serde_json::Value;

/// Fallback copy when a failure carries no usable message.
pub const FALLBACK_MESSAGE: &str = "Request failed. Please try again.";

/// Normalized failure: a human message, optional machine code and HTTP-like
/// status, and the raw cause for inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionError {
    pub message: String,
    pub code: Option<String>,
    pub status: Option<u16>,
    pub raw: Value,
}

impl ActionError {
    /// Normalize an `{error}` payload or any other raw value the backend
    /// handed back.
    #[must_use]
    pub fn normalize(raw: Value) -> Self {
        let message = message_of(&raw);
        let code = raw
            .get("code")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let status = status_of(&raw);
        Self {
            message,
            code,
            status,
            raw,
        }
    }

    /// Normalize a transport or decode failure from the backend boundary.
    #[must_use]
    pub fn from_backend(err: &BackendError) -> Self {
        let status = match err {
            BackendError::Http { status, .. } => Some(*status),
            _ => None,
        };
        Self {
            message: err.to_string(),
            code: None,
            status,
            raw: Value::String(err.to_string()),
        }
    }

    /// A programmer error: the operation name is not in the configured set.
    #[must_use]
    pub fn method_not_found(operation: &str) -> Self {
        Self {
            message: format!("{operation} is not a known auth operation"),
            code: Some("METHOD_NOT_FOUND".to_string()),
            status: None,
            raw: Value::Null,
        }
    }
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.message)
    }
}

impl std::error::Error for ActionError {}

fn message_of(raw: &Value) -> String {
    if let Value::String(message) = raw {
        return message.clone();
    }
    if let Some(message) = raw.get("message").and_then(Value::as_str) {
        return message.to_string();
    }
    FALLBACK_MESSAGE.to_string()
}

fn status_of(raw: &Value) -> Option<u16> {
    let status = raw
        .get("status")
        .and_then(Value::as_u64)
        .or_else(|| raw.get("statusCode").and_then(Value::as_u64))?;
    u16::try_from(status).ok()
}
