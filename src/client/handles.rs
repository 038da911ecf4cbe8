//! Observable handles around named auth operations.
//!
//! Each handle is a small state machine (idle, pending, success, error) with
//! last-call-wins semantics: a generation counter decides which completion
//! may commit state, and slower stale calls are discarded silently. The set
//! of valid operation names is fixed when the registry is built; looking up
//! anything else is a programmer error reported through the error channel
//! at execute time, never a panic.

use crate::auth::backend::{error_payload, AuthBackend};
use crate::client::error::ActionError;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Operation names every wrapped backend exposes.
pub const DEFAULT_OPERATIONS: &[&str] = &[
    "sign-in/email",
    "sign-in/social",
    "sign-in/passkey",
    "sign-up/email",
    "sign-out",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// Observable state of one operation handle.
#[derive(Clone, Debug)]
pub struct ActionState {
    pub status: ActionStatus,
    pub data: Option<Value>,
    pub error: Option<ActionError>,
}

impl ActionState {
    fn idle() -> Self {
        Self {
            status: ActionStatus::Idle,
            data: None,
            error: None,
        }
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|error| error.message.as_str())
    }
}

/// Handle for one named operation, cached by name in [`ActionHandles`].
pub struct ActionHandle {
    operation: String,
    known: bool,
    backend: Arc<dyn AuthBackend>,
    state: watch::Sender<ActionState>,
    generation: AtomicU64,
}

impl ActionHandle {
    fn new(operation: String, known: bool, backend: Arc<dyn AuthBackend>) -> Self {
        let (state, _) = watch::channel(ActionState::idle());
        Self {
            operation,
            known,
            backend,
            state,
            generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ActionState {
        self.state.borrow().clone()
    }

    /// Watch the handle; UI code re-renders off this.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ActionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.state().pending()
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.state().error_message().map(ToString::to_string)
    }

    /// Run the operation. Failures, including `{error}`-shaped results and
    /// unknown operation names, are observable only through the handle
    /// state; `execute` itself never fails.
    pub async fn execute(&self, payload: Value) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(ActionState {
            status: ActionStatus::Pending,
            data: None,
            error: None,
        });

        let outcome = if self.known {
            match self.backend.invoke(&self.operation, payload).await {
                Ok(value) => match error_payload(&value) {
                    // result-based failure channel, distinct from transport errors
                    Some(error) => Err(ActionError::normalize(error.clone())),
                    None => Ok(value),
                },
                Err(err) => Err(ActionError::from_backend(&err)),
            }
        } else {
            Err(ActionError::method_not_found(&self.operation))
        };

        // only the most recent call may commit
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        match outcome {
            Ok(data) => self.state.send_replace(ActionState {
                status: ActionStatus::Success,
                data: Some(data),
                error: None,
            }),
            Err(error) => self.state.send_replace(ActionState {
                status: ActionStatus::Error,
                data: None,
                error: Some(error),
            }),
        };
    }
}

/// Factory and cache for operation handles.
pub struct ActionHandles {
    backend: Arc<dyn AuthBackend>,
    known: BTreeSet<String>,
    handles: Mutex<HashMap<String, Arc<ActionHandle>>>,
}

impl ActionHandles {
    /// Registry over the default operation set.
    #[must_use]
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self::with_operations(backend, DEFAULT_OPERATIONS.iter().copied())
    }

    /// Registry over an explicit operation set resolved at configuration
    /// time, e.g. when plugins add strategies.
    pub fn with_operations<'a>(
        backend: Arc<dyn AuthBackend>,
        operations: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            backend,
            known: operations.into_iter().map(ToString::to_string).collect(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// The stable handle for an operation name, created lazily and cached.
    /// Unknown names still get a handle; it reports "not a known operation"
    /// when executed.
    #[must_use]
    pub fn handle(&self, operation: &str) -> Arc<ActionHandle> {
        let mut handles = self.handles.lock().expect("action handles poisoned");
        handles
            .entry(operation.to_string())
            .or_insert_with(|| {
                Arc::new(ActionHandle::new(
                    operation.to_string(),
                    self.known.contains(operation),
                    self.backend.clone(),
                ))
            })
            .clone()
    }

    /// Configured operation names, mostly for introspection.
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{OpStep, ScriptedBackend};
    use serde_json::json;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn success_populates_data() {
        let backend = ScriptedBackend::with_session(None);
        backend.push_op(OpStep::Value(json!({"token": "abc"})));
        let handles = ActionHandles::new(backend);

        let handle = handles.handle("sign-in/email");
        handle.execute(json!({"email": "ana@example.com"})).await;

        let state = handle.state();
        assert_eq!(state.status, ActionStatus::Success);
        assert_eq!(state.data, Some(json!({"token": "abc"})));
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn error_shaped_results_use_the_error_channel() {
        let backend = ScriptedBackend::with_session(None);
        backend.push_op(OpStep::Value(json!({
            "error": {"message": "Invalid password", "code": "INVALID_PASSWORD"}
        })));
        let handles = ActionHandles::new(backend);

        let handle = handles.handle("sign-in/email");
        handle.execute(json!({})).await;

        let state = handle.state();
        assert_eq!(state.status, ActionStatus::Error);
        assert!(state.data.is_none());
        assert_eq!(state.error_message(), Some("Invalid password"));
    }

    #[tokio::test]
    async fn transport_failures_are_caught() {
        let backend = ScriptedBackend::with_session(None);
        backend.push_op(OpStep::Fail("connection refused".to_string()));
        let handles = ActionHandles::new(backend);

        let handle = handles.handle("sign-up/email");
        handle.execute(json!({})).await;

        let state = handle.state();
        assert_eq!(state.status, ActionStatus::Error);
        assert_eq!(state.error.as_ref().and_then(|e| e.status), Some(500));
    }

    #[tokio::test]
    async fn unknown_operation_reports_through_the_error_channel() {
        let backend = ScriptedBackend::with_session(None);
        let handles = ActionHandles::new(backend);

        let handle = handles.handle("sign-in/telepathy");
        handle.execute(json!({})).await;

        let state = handle.state();
        assert_eq!(state.status, ActionStatus::Error);
        assert_eq!(
            state.error.as_ref().and_then(|e| e.code.as_deref()),
            Some("METHOD_NOT_FOUND")
        );
    }

    #[tokio::test]
    async fn handles_are_cached_by_name() {
        let backend = ScriptedBackend::with_session(None);
        let handles = ActionHandles::new(backend);
        let first = handles.handle("sign-in/email");
        let second = handles.handle("sign-in/email");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn slow_stale_call_cannot_overwrite_the_latest() {
        let backend = ScriptedBackend::with_session(None);
        let gate = Arc::new(Notify::new());
        // call A blocks until released, call B resolves immediately
        backend.push_op(OpStep::Gated(gate.clone(), json!({"call": "a"})));
        backend.push_op(OpStep::Value(json!({"call": "b"})));
        let handles = ActionHandles::new(backend);
        let handle = handles.handle("sign-in/email");

        let first = tokio::spawn({
            let handle = handle.clone();
            async move { handle.execute(json!({})).await }
        });
        // make sure A is underway before starting B
        tokio::task::yield_now().await;
        handle.execute(json!({})).await;
        assert_eq!(handle.state().data, Some(json!({"call": "b"})));

        // releasing A must not clobber B's result
        gate.notify_one();
        first.await.expect("first call");
        let state = handle.state();
        assert_eq!(state.status, ActionStatus::Success);
        assert_eq!(state.data, Some(json!({"call": "b"})));
    }
}
