use clap::{Arg, ArgMatches, Command};

pub const ARG_PROXY_PORT: &str = "proxy-port";
pub const ARG_AUTH_PORT: &str = "auth-port";
pub const ARG_EXTERNAL_PORT: &str = "external-port";
pub const ARG_EXTERNAL_SCHEME: &str = "external-scheme";

#[derive(Debug, Clone)]
pub struct Options {
    pub proxy_port: u16,
    pub auth_port: u16,
    /// Port clients see in URLs; defaults to the proxy port.
    pub external_port: u16,
    pub external_scheme: String,
}

impl Options {
    /// Parse listener arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the external scheme is not `http` or `https`.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let proxy_port = matches.get_one::<u16>(ARG_PROXY_PORT).copied().unwrap_or(9443);
        let auth_port = matches.get_one::<u16>(ARG_AUTH_PORT).copied().unwrap_or(8443);
        let external_port = matches
            .get_one::<u16>(ARG_EXTERNAL_PORT)
            .copied()
            .unwrap_or(proxy_port);

        let external_scheme = matches
            .get_one::<String>(ARG_EXTERNAL_SCHEME)
            .map_or_else(|| "https".to_string(), |scheme| scheme.trim().to_lowercase());
        if external_scheme != "http" && external_scheme != "https" {
            anyhow::bail!("--{ARG_EXTERNAL_SCHEME} must be http or https, got {external_scheme}");
        }

        Ok(Self {
            proxy_port,
            auth_port,
            external_port,
            external_scheme,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PROXY_PORT)
                .long(ARG_PROXY_PORT)
                .help("Port of the proxy listener")
                .default_value("9443")
                .env("GATEWARDEN_PROXY_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_AUTH_PORT)
                .long(ARG_AUTH_PORT)
                .help("Port of the login, dashboard and admin listener")
                .default_value("8443")
                .env("GATEWARDEN_AUTH_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_EXTERNAL_PORT)
                .long(ARG_EXTERNAL_PORT)
                .help("Port used when building redirect URLs (default: proxy port)")
                .long_help(
                    "Port used when building redirect and landing URLs. Set it when a load balancer\nor TLS terminator in front of the gateway exposes a different port.",
                )
                .env("GATEWARDEN_EXTERNAL_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_EXTERNAL_SCHEME)
                .long(ARG_EXTERNAL_SCHEME)
                .help("Scheme clients use to reach the gateway")
                .default_value("https")
                .env("GATEWARDEN_EXTERNAL_SCHEME"),
        )
}
