use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_STORE_URL: &str = "store-url";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";

/// Store URL selecting the in-process backend.
pub const MEMORY_STORE_URL: &str = "memory://";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub timeout: Duration,
}

impl Options {
    /// Parse store arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the URL scheme is neither `redis`, `rediss` nor `memory`.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let url = matches
            .get_one::<String>(ARG_STORE_URL)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

        if !(url == MEMORY_STORE_URL || url.starts_with("redis://") || url.starts_with("rediss://"))
        {
            anyhow::bail!("--{ARG_STORE_URL} must be redis://, rediss:// or {MEMORY_STORE_URL}");
        }

        let timeout = matches
            .get_one::<u64>(ARG_STORE_TIMEOUT_SECONDS)
            .copied()
            .unwrap_or(2);

        Ok(Self {
            url,
            timeout: Duration::from_secs(timeout.max(1)),
        })
    }

    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_STORE_URL
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STORE_URL)
                .long(ARG_STORE_URL)
                .help("Valkey/Redis URL for users, roles and sessions (memory:// for an in-process store)")
                .default_value("redis://127.0.0.1:6379")
                .env("GATEWARDEN_STORE_URL"),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Connection and response timeout for store commands")
                .default_value("2")
                .env("GATEWARDEN_STORE_TIMEOUT_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<Options> {
        let matches = with_args(Command::new("test")).try_get_matches_from(args)?;
        Options::parse(&matches)
    }

    #[test]
    fn store_urls() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("GATEWARDEN_STORE_URL", None::<&str>),
                ("GATEWARDEN_STORE_TIMEOUT_SECONDS", None),
            ],
            || {
                let options = parse(&["test"])?;
                assert_eq!(options.url, "redis://127.0.0.1:6379");
                assert!(!options.is_memory());
                assert_eq!(options.timeout, Duration::from_secs(2));

                assert!(parse(&["test", "--store-url", "memory://"])?.is_memory());
                assert!(parse(&["test", "--store-url", "postgres://db"]).is_err());
                Ok(())
            },
        )
    }
}
