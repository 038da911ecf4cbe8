//! Command-line argument dispatch.
//!
//! This module maps validated CLI arguments to the appropriate action,
//! such as starting the gateway with its full configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{backend, redirects};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let rules_path = matches.get_one::<String>("rules").cloned();

    let backend_opts = backend::Options::parse(matches).map_err(|e| anyhow::anyhow!(e))?;
    let redirect_opts = redirects::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        rules_path,
        backend_url: backend_opts.backend_url,
        service_secret: backend_opts.service_secret,
        frontend_origin: backend_opts.frontend_origin,
        login_redirect: redirect_opts.login_redirect,
        guest_redirect: redirect_opts.guest_redirect,
        authenticated_redirect: redirect_opts.authenticated_redirect,
        logout_redirect: redirect_opts.logout_redirect,
        redirect_key: redirect_opts.redirect_key,
        preserve_redirect: redirect_opts.preserve_redirect,
        reverify_hydrated: redirect_opts.reverify_hydrated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_url_required() {
        temp_env::with_vars([("GARDI_BACKEND_URL", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec!["gardi"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(
                    err.to_string()
                        .contains("missing required argument: --backend-url")
                );
            }
        });
    }

    #[test]
    fn full_invocation_maps_to_server_args() {
        temp_env::with_vars(
            [
                ("GARDI_BACKEND_URL", Some("http://127.0.0.1:3000/api/auth")),
                ("GARDI_LOGOUT_REDIRECT", Some("/goodbye")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches =
                    command.get_matches_from(vec!["gardi", "--no-preserve-redirect"]);
                let Action::Server(args) = handler(&matches).expect("action");
                assert_eq!(args.backend_url, "http://127.0.0.1:3000/api/auth");
                assert_eq!(args.logout_redirect.as_deref(), Some("/goodbye"));
                assert!(!args.preserve_redirect);
                assert_eq!(args.port, 8080);
            },
        );
    }
}
