pub mod backend;
pub mod logging;
pub mod redirects;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("gardi")
        .about("Session and route access control")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("GARDI_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("rules")
                .short('r')
                .long("rules")
                .help("Path to the JSON route-rule table")
                .long_help(
                    "Path to the JSON route-rule table mapping path patterns to access \
                     requirements, example: {\"/app/**\": \"user\", \"/login\": \"guest\"}. \
                     Without a table every route is public.",
                )
                .env("GARDI_RULES"),
        );

    let command = backend::with_args(command);
    let command = redirects::with_args(command);
    logging::with_args(command)
}
