//! Scripted in-process backend for unit tests.

use crate::auth::backend::{AuthBackend, BackendError};
use crate::auth::types::AppSession;
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) fn sample_session(role: &str) -> AppSession {
    serde_json::from_value(json!({
        "user": {
            "id": "usr_1",
            "email": "ana@example.com",
            "name": "Ana",
            "role": role,
        },
        "session": {
            "id": "ses_1",
            "userId": "usr_1",
        },
    }))
    .expect("sample session")
}

/// One step of a scripted `get_session` sequence.
pub(crate) struct SessionStep {
    pub wait: Option<Arc<Notify>>,
    pub value: Option<AppSession>,
}

/// One step of a scripted operation (`invoke`, `sign_out`, `update_user`).
pub(crate) enum OpStep {
    Value(Value),
    /// Block until notified, then resolve to the value.
    Gated(Arc<Notify>, Value),
    Fail(String),
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    /// Fallback session when no scripted step is queued.
    pub session: Mutex<Option<AppSession>>,
    pub session_script: Mutex<VecDeque<SessionStep>>,
    pub session_calls: AtomicUsize,
    pub session_delay_ms: AtomicU64,
    pub fail_session: AtomicBool,
    pub ops: Mutex<VecDeque<OpStep>>,
}

impl ScriptedBackend {
    pub fn with_session(session: Option<AppSession>) -> Arc<Self> {
        let backend = Self::default();
        *backend.session.lock().unwrap() = session;
        Arc::new(backend)
    }

    pub fn push_session_step(&self, step: SessionStep) {
        self.session_script.lock().unwrap().push_back(step);
    }

    pub fn push_op(&self, step: OpStep) {
        self.ops.lock().unwrap().push_back(step);
    }

    async fn next_op(&self) -> Result<Value, BackendError> {
        let step = self.ops.lock().unwrap().pop_front();
        match step {
            None => Ok(json!({ "ok": true })),
            Some(OpStep::Value(value)) => Ok(value),
            Some(OpStep::Gated(notify, value)) => {
                notify.notified().await;
                Ok(value)
            }
            Some(OpStep::Fail(message)) => Err(BackendError::Http {
                status: 500,
                message,
            }),
        }
    }
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn get_session(&self, _headers: &HeaderMap) -> Result<Option<AppSession>, BackendError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);

        let step = self.session_script.lock().unwrap().pop_front();
        if let Some(step) = step {
            if let Some(wait) = step.wait {
                wait.notified().await;
            }
            return Ok(step.value);
        }

        let delay = self.session_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(BackendError::Http {
                status: 500,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn invoke(&self, _operation: &str, _payload: Value) -> Result<Value, BackendError> {
        self.next_op().await
    }

    async fn sign_out(&self, _headers: &HeaderMap) -> Result<Value, BackendError> {
        self.next_op().await
    }

    async fn update_user(&self, _patch: Value, _headers: &HeaderMap) -> Result<Value, BackendError> {
        self.next_op().await
    }
}
