use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;
use url::Url;

pub const ARG_LOGIN_URL: &str = "login-url";
pub const ARG_SESSION_COOKIE_NAME: &str = "session-cookie-name";
pub const ARG_SESSION_COOKIE_DOMAIN: &str = "session-cookie-domain";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_TOTP_ISSUER: &str = "totp-issuer";

#[derive(Debug, Clone)]
pub struct Options {
    pub login_url: String,
    pub cookie_name: String,
    pub cookie_domain: Option<String>,
    pub ttl: Duration,
    pub totp_issuer: String,
}

/// Cookie names are RFC 6265 tokens.
fn valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

impl Options {
    /// Parse session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the login URL is not an absolute http(s) URL, the cookie
    /// name is not a valid token or the TTL is zero.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let login_url = get_non_empty(ARG_LOGIN_URL)
            .with_context(|| format!("missing required argument: --{ARG_LOGIN_URL}"))?;
        let parsed = Url::parse(&login_url)
            .with_context(|| format!("invalid --{ARG_LOGIN_URL}: {login_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            anyhow::bail!("--{ARG_LOGIN_URL} must be an absolute http(s) URL: {login_url}");
        }

        let cookie_name = get_non_empty(ARG_SESSION_COOKIE_NAME)
            .unwrap_or_else(|| "gatewarden_session".to_string());
        if !valid_cookie_name(&cookie_name) {
            anyhow::bail!("invalid --{ARG_SESSION_COOKIE_NAME}: {cookie_name}");
        }

        let ttl_seconds = matches
            .get_one::<u64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .unwrap_or(86_400);
        if ttl_seconds == 0 {
            anyhow::bail!("--{ARG_SESSION_TTL_SECONDS} must be greater than zero");
        }

        Ok(Self {
            login_url,
            cookie_name,
            cookie_domain: get_non_empty(ARG_SESSION_COOKIE_DOMAIN),
            ttl: Duration::from_secs(ttl_seconds),
            totp_issuer: get_non_empty(ARG_TOTP_ISSUER)
                .unwrap_or_else(|| "Gatewarden".to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_URL)
                .long(ARG_LOGIN_URL)
                .help("External URL of the login surface")
                .default_value("https://auth.localhost:8443")
                .env("GATEWARDEN_LOGIN_URL"),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_NAME)
                .long(ARG_SESSION_COOKIE_NAME)
                .help("Name of the session cookie")
                .default_value("gatewarden_session")
                .env("GATEWARDEN_SESSION_COOKIE_NAME"),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_DOMAIN)
                .long(ARG_SESSION_COOKIE_DOMAIN)
                .help("Domain attribute of the session cookie (default: host-only)")
                .long_help(
                    "Domain attribute of the session cookie. Set it to a parent domain (for example\n.corp.lan) so one login covers every upstream host.",
                )
                .env("GATEWARDEN_SESSION_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Sliding session TTL in seconds")
                .default_value("86400")
                .env("GATEWARDEN_SESSION_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_TOTP_ISSUER)
                .long(ARG_TOTP_ISSUER)
                .help("Issuer shown in authenticator apps")
                .default_value("Gatewarden")
                .env("GATEWARDEN_TOTP_ISSUER"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAR: [(&str, Option<&str>); 5] = [
        ("GATEWARDEN_LOGIN_URL", None),
        ("GATEWARDEN_SESSION_COOKIE_NAME", None),
        ("GATEWARDEN_SESSION_COOKIE_DOMAIN", None),
        ("GATEWARDEN_SESSION_TTL_SECONDS", None),
        ("GATEWARDEN_TOTP_ISSUER", None),
    ];

    fn parse(args: &[&str]) -> anyhow::Result<Options> {
        let matches = with_args(Command::new("test")).try_get_matches_from(args)?;
        Options::parse(&matches)
    }

    #[test]
    fn defaults() -> anyhow::Result<()> {
        temp_env::with_vars(CLEAR, || {
            let options = parse(&["test"])?;
            assert_eq!(options.login_url, "https://auth.localhost:8443");
            assert_eq!(options.cookie_name, "gatewarden_session");
            assert_eq!(options.cookie_domain, None);
            assert_eq!(options.ttl, Duration::from_secs(86_400));
            assert_eq!(options.totp_issuer, "Gatewarden");
            Ok(())
        })
    }

    #[test]
    fn from_env() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("GATEWARDEN_LOGIN_URL", Some("https://login.corp.lan")),
                ("GATEWARDEN_SESSION_COOKIE_NAME", Some("corp_sid")),
                ("GATEWARDEN_SESSION_COOKIE_DOMAIN", Some(".corp.lan")),
                ("GATEWARDEN_SESSION_TTL_SECONDS", Some("600")),
                ("GATEWARDEN_TOTP_ISSUER", Some("Corp")),
            ],
            || {
                let options = parse(&["test"])?;
                assert_eq!(options.login_url, "https://login.corp.lan");
                assert_eq!(options.cookie_name, "corp_sid");
                assert_eq!(options.cookie_domain.as_deref(), Some(".corp.lan"));
                assert_eq!(options.ttl, Duration::from_secs(600));
                assert_eq!(options.totp_issuer, "Corp");
                Ok(())
            },
        )
    }

    #[test]
    fn rejects_bad_values() {
        temp_env::with_vars(CLEAR, || {
            assert!(parse(&["test", "--login-url", "auth.lan"]).is_err());
            assert!(parse(&["test", "--login-url", "ftp://auth.lan"]).is_err());
            assert!(parse(&["test", "--session-cookie-name", "a;b"]).is_err());
            assert!(parse(&["test", "--session-ttl-seconds", "0"]).is_err());
        });
    }
}
