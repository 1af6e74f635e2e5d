use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ADMIN_TOKEN: &str = "admin-token";

/// Bearer token guarding `/api/admin`. Empty or unset disables the admin API.
#[must_use]
pub fn parse(matches: &ArgMatches) -> Option<SecretString> {
    matches
        .get_one::<String>(ARG_ADMIN_TOKEN)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .map(SecretString::from)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_ADMIN_TOKEN)
            .long(ARG_ADMIN_TOKEN)
            .help("Bearer token for the admin API (unset disables it)")
            .env("GATEWARDEN_ADMIN_TOKEN")
            .hide_env_values(true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn token_is_optional() {
        temp_env::with_vars([("GATEWARDEN_ADMIN_TOKEN", None::<&str>)], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            assert!(parse(&matches).is_none());
        });

        temp_env::with_vars([("GATEWARDEN_ADMIN_TOKEN", Some("  "))], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            assert!(parse(&matches).is_none());
        });

        temp_env::with_vars([("GATEWARDEN_ADMIN_TOKEN", Some("t0k3n"))], || {
            let matches = with_args(Command::new("test")).get_matches_from(vec!["test"]);
            assert_eq!(
                parse(&matches).map(|token| token.expose_secret().to_string()),
                Some("t0k3n".to_string())
            );
        });
    }
}
