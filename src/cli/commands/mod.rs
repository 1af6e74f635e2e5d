pub mod access;
pub mod admin;
pub mod listen;
pub mod logging;
pub mod routing;
pub mod session;
pub mod store;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    ColorChoice, Command,
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

    let command = Command::new("gatewarden")
        .about("Session-authenticated access-control reverse proxy")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles);

    let command = listen::with_args(command);
    let command = routing::with_args(command);
    let command = store::with_args(command);
    let command = session::with_args(command);
    let command = access::with_args(command);
    let command = admin::with_args(command);
    logging::with_args(command)
}
