use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_LOGIN_REDIRECT: &str = "login-redirect";
pub const ARG_GUEST_REDIRECT: &str = "guest-redirect";
pub const ARG_AUTHENTICATED_REDIRECT: &str = "authenticated-redirect";
pub const ARG_LOGOUT_REDIRECT: &str = "logout-redirect";
pub const ARG_REDIRECT_KEY: &str = "redirect-key";
pub const ARG_NO_PRESERVE_REDIRECT: &str = "no-preserve-redirect";
pub const ARG_REVERIFY_HYDRATED: &str = "reverify-hydrated";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_REDIRECT)
                .long(ARG_LOGIN_REDIRECT)
                .help("Where unauthenticated callers of protected routes are sent")
                .env("GARDI_LOGIN_REDIRECT")
                .default_value("/login"),
        )
        .arg(
            Arg::new(ARG_GUEST_REDIRECT)
                .long(ARG_GUEST_REDIRECT)
                .help("Where authenticated callers of guest-only routes are sent")
                .env("GARDI_GUEST_REDIRECT")
                .default_value("/"),
        )
        .arg(
            Arg::new(ARG_AUTHENTICATED_REDIRECT)
                .long(ARG_AUTHENTICATED_REDIRECT)
                .help("Fallback landing page after sign-in")
                .env("GARDI_AUTHENTICATED_REDIRECT")
                .default_value("/"),
        )
        .arg(
            Arg::new(ARG_LOGOUT_REDIRECT)
                .long(ARG_LOGOUT_REDIRECT)
                .help("Optional landing page after sign-out")
                .env("GARDI_LOGOUT_REDIRECT"),
        )
        .arg(
            Arg::new(ARG_REDIRECT_KEY)
                .long(ARG_REDIRECT_KEY)
                .help("Query key carrying the originally requested path on login redirects")
                .env("GARDI_REDIRECT_KEY")
                .default_value("redirect"),
        )
        .arg(
            Arg::new(ARG_NO_PRESERVE_REDIRECT)
                .long(ARG_NO_PRESERVE_REDIRECT)
                .help("Do not carry the originally requested path on login redirects")
                .env("GARDI_NO_PRESERVE_REDIRECT")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_REVERIFY_HYDRATED)
                .long(ARG_REVERIFY_HYDRATED)
                .help("Re-fetch the session on the client even when server-rendered state is hydrated")
                .env("GARDI_REVERIFY_HYDRATED")
                .action(ArgAction::SetTrue),
        )
}

#[derive(Debug)]
pub struct Options {
    pub login_redirect: String,
    pub guest_redirect: String,
    pub authenticated_redirect: String,
    pub logout_redirect: Option<String>,
    pub redirect_key: String,
    pub preserve_redirect: bool,
    pub reverify_hydrated: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            login_redirect: matches
                .get_one::<String>(ARG_LOGIN_REDIRECT)
                .cloned()
                .unwrap_or_else(|| "/login".to_string()),
            guest_redirect: matches
                .get_one::<String>(ARG_GUEST_REDIRECT)
                .cloned()
                .unwrap_or_else(|| "/".to_string()),
            authenticated_redirect: matches
                .get_one::<String>(ARG_AUTHENTICATED_REDIRECT)
                .cloned()
                .unwrap_or_else(|| "/".to_string()),
            logout_redirect: matches.get_one::<String>(ARG_LOGOUT_REDIRECT).cloned(),
            redirect_key: matches
                .get_one::<String>(ARG_REDIRECT_KEY)
                .cloned()
                .unwrap_or_else(|| "redirect".to_string()),
            preserve_redirect: !matches.get_flag(ARG_NO_PRESERVE_REDIRECT),
            reverify_hydrated: matches.get_flag(ARG_REVERIFY_HYDRATED),
        }
    }
}
