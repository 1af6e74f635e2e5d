use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::{
    access::{PermissionRule, PermissionSet},
    upstream::UpstreamTable,
};

pub const ARG_UPSTREAM: &str = "upstream";
pub const ARG_PUBLIC_ROUTE: &str = "public-route";
pub const ARG_API_PREFIX: &str = "api-prefix";
pub const ARG_DEFAULT_HOST: &str = "default-host";

#[derive(Debug, Clone)]
pub struct Options {
    pub upstreams: UpstreamTable,
    pub public_routes: PermissionSet,
    pub api_prefixes: Vec<String>,
    pub default_host: Option<String>,
}

fn values(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| {
            values
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Options {
    /// Parse routing arguments from matches.
    ///
    /// # Errors
    /// Returns an error on a malformed upstream pair or public route.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let raw_upstreams = values(matches, ARG_UPSTREAM);
        if raw_upstreams.is_empty() {
            anyhow::bail!("missing required argument: --{ARG_UPSTREAM}");
        }
        let upstreams =
            UpstreamTable::parse(&raw_upstreams).context("invalid --upstream value")?;

        let mut public_routes = PermissionSet::new();
        for raw in values(matches, ARG_PUBLIC_ROUTE) {
            let rule = raw
                .parse::<PermissionRule>()
                .with_context(|| format!("invalid --{ARG_PUBLIC_ROUTE} value: {raw}"))?;
            public_routes.insert(rule);
        }

        let mut api_prefixes = values(matches, ARG_API_PREFIX);
        if api_prefixes.is_empty() {
            api_prefixes.push("/api/".to_string());
        }

        Ok(Self {
            upstreams,
            public_routes,
            api_prefixes,
            default_host: matches
                .get_one::<String>(ARG_DEFAULT_HOST)
                .map(|host| host.trim().to_string())
                .filter(|host| !host.is_empty()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_UPSTREAM)
                .long(ARG_UPSTREAM)
                .help("Upstream as host=destination, repeatable or comma separated")
                .long_help(
                    "Upstream as host=destination, for example app.lan=http://127.0.0.1:3000.\nThe request host (port stripped) selects the destination; path and query are\nforwarded verbatim. Repeat the flag or pass a comma-separated list.",
                )
                .env("GATEWARDEN_UPSTREAMS")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .required(true),
        )
        .arg(
            Arg::new(ARG_PUBLIC_ROUTE)
                .long(ARG_PUBLIC_ROUTE)
                .help("Route served without a session, as a permission rule (host, /path or host/path)")
                .env("GATEWARDEN_PUBLIC_ROUTES")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_API_PREFIX)
                .long(ARG_API_PREFIX)
                .help("Path prefix answered with JSON 403 on denial (default: /api/)")
                .env("GATEWARDEN_API_PREFIXES")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_DEFAULT_HOST)
                .long(ARG_DEFAULT_HOST)
                .help("Host for landing and denial redirects (default: first upstream)")
                .env("GATEWARDEN_DEFAULT_HOST"),
        )
}
