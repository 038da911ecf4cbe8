use clap::{Arg, ArgMatches, Command};

pub const ARG_BACKEND_URL: &str = "backend-url";
pub const ARG_SERVICE_SECRET: &str = "service-secret";
pub const ARG_FRONTEND_ORIGIN: &str = "frontend-origin";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKEND_URL)
                .short('b')
                .long(ARG_BACKEND_URL)
                .help("Auth backend mount, example: http://127.0.0.1:3000/api/auth")
                .env("GARDI_BACKEND_URL"),
        )
        .arg(
            Arg::new(ARG_SERVICE_SECRET)
                .long(ARG_SERVICE_SECRET)
                .help("Shared secret sent to the auth backend on every call")
                .env("GARDI_SERVICE_SECRET"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_ORIGIN)
                .long(ARG_FRONTEND_ORIGIN)
                .help("Frontend origin allowed by CORS, example: https://app.example.com")
                .env("GARDI_FRONTEND_ORIGIN"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub backend_url: String,
    pub service_secret: Option<String>,
    pub frontend_origin: Option<String>,
}

impl Options {
    /// # Errors
    /// Returns an error when the backend URL is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self, String> {
        let backend_url = matches
            .get_one::<String>(ARG_BACKEND_URL)
            .cloned()
            .ok_or_else(|| format!("missing required argument: --{ARG_BACKEND_URL}"))?;
        Ok(Self {
            backend_url,
            service_secret: matches.get_one::<String>(ARG_SERVICE_SECRET).cloned(),
            frontend_origin: matches.get_one::<String>(ARG_FRONTEND_ORIGIN).cloned(),
        })
    }
}
