//! The wrapped auth backend, consumed as a black box over HTTP.
//!
//! The handle is constructed once at boot and injected wherever session
//! resolution or auth operations are needed; there is no module-level
//! instance. HTTP-level failures surface as `{error}`-shaped results so the
//! action layer can route them through its error channel, while transport
//! and decode failures are real `Err`s.

use crate::auth::types::AppSession;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

/// Header carrying the optional shared secret between this layer and the
/// backend.
pub const SERVICE_SECRET_HEADER: &str = "x-service-secret";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("auth backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth backend returned {status}: {message}")]
    Http { status: u16, message: String },
    #[error("auth backend response could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid auth backend endpoint: {0}")]
    Endpoint(String),
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Response relayed verbatim by the auth passthrough route.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// `Some(error)` when a backend result is `{error: <truthy>}`.
#[must_use]
pub fn error_payload(value: &Value) -> Option<&Value> {
    let error = value.get("error")?;
    match error {
        Value::Null | Value::Bool(false) => None,
        _ => Some(error),
    }
}

/// Boundary to the wrapped authentication service.
///
/// Only `get_session` is required; gates and stores that never invoke auth
/// operations can run against a session-only backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Resolve the caller identified by `headers` (cookies or bearer token).
    ///
    /// # Errors
    /// Returns a `BackendError` when the backend is unreachable or replies
    /// with something unusable. Callers on the page path degrade this to
    /// "no session".
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<AppSession>, BackendError>;

    /// Invoke a named auth operation such as `sign-in/email`.
    ///
    /// # Errors
    /// Transport or decode failure only; HTTP-level refusals come back as
    /// `{error}`-shaped values.
    async fn invoke(&self, operation: &str, payload: Value) -> Result<Value, BackendError> {
        let _ = (operation, payload);
        Err(BackendError::Unsupported("invoke"))
    }

    /// Terminate the caller's session on the backend.
    ///
    /// # Errors
    /// Transport or decode failure only.
    async fn sign_out(&self, headers: &HeaderMap) -> Result<Value, BackendError> {
        let _ = headers;
        Err(BackendError::Unsupported("sign_out"))
    }

    /// Persist a partial user update for the caller.
    ///
    /// # Errors
    /// Transport or decode failure only.
    async fn update_user(&self, patch: Value, headers: &HeaderMap) -> Result<Value, BackendError> {
        let _ = (patch, headers);
        Err(BackendError::Unsupported("update_user"))
    }

    /// Cheap reachability probe for health reporting.
    ///
    /// # Errors
    /// Returns the underlying failure when the backend is unreachable.
    async fn probe(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Relay an arbitrary auth request, used by the catch-all passthrough.
    ///
    /// # Errors
    /// Transport failure only; the response status is relayed, not judged.
    async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedResponse, BackendError> {
        let _ = (method, path_and_query, headers, body);
        Err(BackendError::Unsupported("forward"))
    }
}

/// HTTP client for a backend mounted at a base URL such as
/// `http://127.0.0.1:3000/api/auth`.
pub struct HttpAuthBackend {
    base: Url,
    client: reqwest::Client,
    secret: Option<SecretString>,
}

impl HttpAuthBackend {
    /// # Errors
    /// Returns `Endpoint` for an unparsable base URL.
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let mut base =
            Url::parse(base_url).map_err(|err| BackendError::Endpoint(err.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()?;
        Ok(Self {
            base,
            client,
            secret: None,
        })
    }

    #[must_use]
    pub fn with_secret(mut self, secret: SecretString) -> Self {
        self.secret = Some(secret);
        self
    }

    fn endpoint(&self, subpath: &str) -> Result<Url, BackendError> {
        self.base
            .join(subpath.trim_start_matches('/'))
            .map_err(|err| BackendError::Endpoint(err.to_string()))
    }

    /// Forward only what the backend needs to identify the caller.
    fn request_headers(&self, headers: &HeaderMap) -> HeaderMap {
        let mut out = HeaderMap::new();
        for name in [COOKIE, AUTHORIZATION, CONTENT_TYPE] {
            for value in headers.get_all(&name) {
                out.append(name.clone(), value.clone());
            }
        }
        if let Some(secret) = &self.secret {
            if let Ok(value) = HeaderValue::from_str(secret.expose_secret()) {
                out.insert(HeaderName::from_static(SERVICE_SECRET_HEADER), value);
            }
        }
        out
    }

    async fn post_json(
        &self,
        subpath: &str,
        payload: &Value,
        headers: &HeaderMap,
    ) -> Result<Value, BackendError> {
        let url = self.endpoint(subpath)?;
        let response = self
            .client
            .post(url)
            .headers(self.request_headers(headers))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let body: Option<Value> = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        if status.is_success() {
            return Ok(body.unwrap_or(Value::Null));
        }

        // A refusal with a response is a result, not an exception: wrap it
        // so the action error channel picks it up.
        let mut detail = body.unwrap_or_else(|| json!({ "message": text }));
        if let Some(object) = detail.as_object_mut() {
            object
                .entry("status")
                .or_insert_with(|| json!(status.as_u16()));
        }
        Ok(json!({ "error": detail }))
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<AppSession>, BackendError> {
        let url = self.endpoint("get-session")?;
        let response = self
            .client
            .get(url)
            .headers(self.request_headers(headers))
            .send()
            .await?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::NO_CONTENT | StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND
        ) {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(BackendError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let value: Value = response.json().await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(BackendError::Decode)
    }

    async fn invoke(&self, operation: &str, payload: Value) -> Result<Value, BackendError> {
        self.post_json(operation, &payload, &HeaderMap::new()).await
    }

    async fn sign_out(&self, headers: &HeaderMap) -> Result<Value, BackendError> {
        self.post_json("sign-out", &json!({}), headers).await
    }

    async fn update_user(&self, patch: Value, headers: &HeaderMap) -> Result<Value, BackendError> {
        self.post_json("update-user", &patch, headers).await
    }

    async fn probe(&self) -> Result<(), BackendError> {
        let url = self.endpoint("ok")?;
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::Http {
                status: status.as_u16(),
                message: "backend probe failed".to_string(),
            })
        }
    }

    async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<ForwardedResponse, BackendError> {
        let url = self.endpoint(path_and_query)?;
        let mut request = self
            .client
            .request(method, url)
            .headers(self.request_headers(headers));
        if !body.is_empty() {
            request = request.body(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let mut relayed = HeaderMap::new();
        for name in [CONTENT_TYPE, SET_COOKIE] {
            for value in response.headers().get_all(&name) {
                relayed.append(name.clone(), value.clone());
            }
        }
        let body = response.bytes().await?;
        Ok(ForwardedResponse {
            status,
            headers: relayed,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_requires_truthiness() {
        assert!(error_payload(&json!({"error": {"message": "nope"}})).is_some());
        assert!(error_payload(&json!({"error": "bad credentials"})).is_some());
        assert!(error_payload(&json!({"error": null})).is_none());
        assert!(error_payload(&json!({"error": false})).is_none());
        assert!(error_payload(&json!({"data": {}})).is_none());
    }

    #[test]
    fn endpoint_joins_relative_to_the_mount() {
        let backend = HttpAuthBackend::new("http://127.0.0.1:3000/api/auth").expect("backend");
        assert_eq!(
            backend.endpoint("get-session").expect("url").as_str(),
            "http://127.0.0.1:3000/api/auth/get-session"
        );
        assert_eq!(
            backend.endpoint("/sign-in/email").expect("url").as_str(),
            "http://127.0.0.1:3000/api/auth/sign-in/email"
        );
    }

    #[test]
    fn secret_rides_a_dedicated_header() {
        let backend = HttpAuthBackend::new("http://127.0.0.1:3000/api/auth")
            .expect("backend")
            .with_secret(SecretString::from(
                "0123456789abcdef0123456789abcdef".to_string(),
            ));
        let headers = backend.request_headers(&HeaderMap::new());
        assert!(headers.contains_key(SERVICE_SECRET_HEADER));
    }
}
