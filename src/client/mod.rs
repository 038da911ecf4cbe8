//! Client-side session state, navigation gating, and auth action handles.
//!
//! Everything here is framework-agnostic: state is exposed through
//! `tokio::sync::watch` so any reactive UI layer can subscribe, and
//! navigation is an injected callback.

pub mod error;
pub mod guard;
pub mod handles;
pub mod store;

pub use error::ActionError;
pub use guard::PageGate;
pub use handles::{ActionHandle, ActionHandles, ActionState, ActionStatus};
pub use store::{FetchOptions, RenderMode, SessionState, SignOutOptions, UserSessionStore};
