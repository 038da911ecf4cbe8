//! Process-wide auth configuration, resolved once at boot and read-only
//! afterwards. Invalid shapes are fatal before the server accepts traffic.

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const DEFAULT_LOGIN_REDIRECT: &str = "/login";
const DEFAULT_GUEST_REDIRECT: &str = "/";
const DEFAULT_AUTHENTICATED_REDIRECT: &str = "/";
const DEFAULT_REDIRECT_KEY: &str = "redirect";
const MIN_SERVICE_SECRET_BYTES: usize = 32;

/// Configuration shapes rejected at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("redirect target must be a root-relative path starting with '/': {0}")]
    RedirectNotRootRelative(String),
    #[error("redirect target must not be protocol-relative: {0}")]
    ProtocolRelativeRedirect(String),
    #[error("redirect query key must not be empty")]
    EmptyRedirectKey,
    #[error("redirect query key must not contain '{1}': {0}")]
    InvalidRedirectKey(String, char),
    #[error("service secret must be at least {MIN_SERVICE_SECRET_BYTES} bytes, got {0}")]
    SecretTooShort(usize),
}

/// Redirect targets and session-bootstrap behavior.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    login_redirect: String,
    guest_redirect: String,
    authenticated_redirect: String,
    logout_redirect: Option<String>,
    preserve_redirect: bool,
    redirect_key: String,
    reverify_hydrated: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            login_redirect: DEFAULT_LOGIN_REDIRECT.to_string(),
            guest_redirect: DEFAULT_GUEST_REDIRECT.to_string(),
            authenticated_redirect: DEFAULT_AUTHENTICATED_REDIRECT.to_string(),
            logout_redirect: None,
            preserve_redirect: true,
            redirect_key: DEFAULT_REDIRECT_KEY.to_string(),
            reverify_hydrated: false,
        }
    }

    /// Where unauthenticated callers of protected routes are sent.
    #[must_use]
    pub fn with_login_redirect(mut self, target: String) -> Self {
        self.login_redirect = target;
        self
    }

    /// Where authenticated callers of guest-only routes are sent.
    #[must_use]
    pub fn with_guest_redirect(mut self, target: String) -> Self {
        self.guest_redirect = target;
        self
    }

    /// Fallback after a completed sign-in when no preserved path applies.
    #[must_use]
    pub fn with_authenticated_redirect(mut self, target: String) -> Self {
        self.authenticated_redirect = target;
        self
    }

    /// Optional navigation after sign-out.
    #[must_use]
    pub fn with_logout_redirect(mut self, target: Option<String>) -> Self {
        self.logout_redirect = target;
        self
    }

    /// Toggle carrying the originally requested path on login redirects.
    #[must_use]
    pub fn with_preserve_redirect(mut self, preserve: bool) -> Self {
        self.preserve_redirect = preserve;
        self
    }

    /// Query key used for redirect preservation.
    #[must_use]
    pub fn with_redirect_key(mut self, key: String) -> Self {
        self.redirect_key = key;
        self
    }

    /// Re-fetch the session on the client even when server-rendered state
    /// was already hydrated.
    #[must_use]
    pub fn with_reverify_hydrated(mut self, reverify: bool) -> Self {
        self.reverify_hydrated = reverify;
        self
    }

    #[must_use]
    pub fn login_redirect(&self) -> &str {
        &self.login_redirect
    }

    #[must_use]
    pub fn guest_redirect(&self) -> &str {
        &self.guest_redirect
    }

    #[must_use]
    pub fn authenticated_redirect(&self) -> &str {
        &self.authenticated_redirect
    }

    #[must_use]
    pub fn logout_redirect(&self) -> Option<&str> {
        self.logout_redirect.as_deref()
    }

    #[must_use]
    pub fn preserve_redirect(&self) -> bool {
        self.preserve_redirect
    }

    #[must_use]
    pub fn redirect_key(&self) -> &str {
        &self.redirect_key
    }

    #[must_use]
    pub fn reverify_hydrated(&self) -> bool {
        self.reverify_hydrated
    }

    /// Validate redirect targets and the preservation key.
    ///
    /// # Errors
    /// Returns the first offending shape. Called from the boot path, never
    /// at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_target(&self.login_redirect)?;
        validate_target(&self.guest_redirect)?;
        validate_target(&self.authenticated_redirect)?;
        if let Some(target) = &self.logout_redirect {
            validate_target(target)?;
        }
        if self.redirect_key.is_empty() {
            return Err(ConfigError::EmptyRedirectKey);
        }
        for reserved in ['=', '&', '#', '?', '/'] {
            if self.redirect_key.contains(reserved) {
                return Err(ConfigError::InvalidRedirectKey(
                    self.redirect_key.clone(),
                    reserved,
                ));
            }
        }
        Ok(())
    }
}

/// A configured redirect target must be same-origin and root-relative.
fn validate_target(target: &str) -> Result<(), ConfigError> {
    if target.starts_with("//") {
        return Err(ConfigError::ProtocolRelativeRedirect(target.to_string()));
    }
    if !target.starts_with('/') {
        return Err(ConfigError::RedirectNotRootRelative(target.to_string()));
    }
    Ok(())
}

/// Shared-secret length check for the backend handshake.
///
/// # Errors
/// Returns `SecretTooShort` for secrets under the minimum length.
pub fn validate_service_secret(secret: &SecretString) -> Result<(), ConfigError> {
    let len = secret.expose_secret().len();
    if len < MIN_SERVICE_SECRET_BYTES {
        return Err(ConfigError::SecretTooShort(len));
    }
    Ok(())
}
