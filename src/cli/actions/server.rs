use crate::api;
use crate::api::route_access::AccessState;
use crate::auth::backend::HttpAuthBackend;
use crate::auth::config::{validate_service_secret, AuthConfig};
use crate::auth::rules::RouteRules;
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{fs, sync::Arc};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub rules_path: Option<String>,
    pub backend_url: String,
    pub service_secret: Option<String>,
    pub frontend_origin: Option<String>,
    pub login_redirect: String,
    pub guest_redirect: String,
    pub authenticated_redirect: String,
    pub logout_redirect: Option<String>,
    pub redirect_key: String,
    pub preserve_redirect: bool,
    pub reverify_hydrated: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error when the configuration is invalid, the rule table does
/// not parse, or the server fails to start. All of it happens before the
/// first request is served.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new()
        .with_login_redirect(args.login_redirect)
        .with_guest_redirect(args.guest_redirect)
        .with_authenticated_redirect(args.authenticated_redirect)
        .with_logout_redirect(args.logout_redirect)
        .with_redirect_key(args.redirect_key)
        .with_preserve_redirect(args.preserve_redirect)
        .with_reverify_hydrated(args.reverify_hydrated);
    config.validate().context("Invalid auth configuration")?;

    let rules = if let Some(path) = &args.rules_path {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read route-rule table: {path}"))?;
        let rules =
            RouteRules::from_json(&raw).context("Invalid route-rule table")?;
        info!("Loaded route rules from {path}");
        rules
    } else {
        debug!("No route-rule table configured; all routes are public");
        RouteRules::new()
    };

    let mut backend =
        HttpAuthBackend::new(&args.backend_url).context("Invalid auth backend URL")?;
    if let Some(secret) = args.service_secret {
        let secret = SecretString::from(secret);
        validate_service_secret(&secret).context("Invalid service secret")?;
        backend = backend.with_secret(secret);
    }

    let state = AccessState::new(Arc::new(backend), Arc::new(config), rules);

    api::new(args.port, state, args.frontend_origin).await
}
