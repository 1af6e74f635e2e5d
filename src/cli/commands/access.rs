use anyhow::Context;
use clap::{Arg, ArgMatches, Command};

use crate::access::{AccessPolicy, PolicyAction};

pub const ARG_ON_NO_PERMISSIONS: &str = "on-no-permissions";
pub const ARG_ON_STORE_ERROR: &str = "on-store-error";

fn action(matches: &ArgMatches, id: &str) -> anyhow::Result<PolicyAction> {
    matches
        .get_one::<String>(id)
        .map_or(Ok(PolicyAction::Allow), |value| {
            value
                .parse::<PolicyAction>()
                .with_context(|| format!("invalid --{id}"))
        })
}

/// Build the access policy from matches.
///
/// # Errors
/// Returns an error if a value is neither `allow` nor `deny`.
pub fn parse(matches: &ArgMatches) -> anyhow::Result<AccessPolicy> {
    Ok(AccessPolicy::new()
        .with_on_no_permissions(action(matches, ARG_ON_NO_PERMISSIONS)?)
        .with_on_store_error(action(matches, ARG_ON_STORE_ERROR)?))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ON_NO_PERMISSIONS)
                .long(ARG_ON_NO_PERMISSIONS)
                .help("Decision for users whose effective permission set is empty: allow or deny")
                .default_value("allow")
                .env("GATEWARDEN_ON_NO_PERMISSIONS"),
        )
        .arg(
            Arg::new(ARG_ON_STORE_ERROR)
                .long(ARG_ON_STORE_ERROR)
                .help("Decision when permissions cannot be resolved: allow or deny")
                .default_value("allow")
                .env("GATEWARDEN_ON_STORE_ERROR"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(args: &[&str]) -> anyhow::Result<AccessPolicy> {
        let matches = with_args(Command::new("test")).try_get_matches_from(args)?;
        parse(&matches)
    }

    #[test]
    fn defaults_fail_open() -> anyhow::Result<()> {
        temp_env::with_vars(
            [
                ("GATEWARDEN_ON_NO_PERMISSIONS", None::<&str>),
                ("GATEWARDEN_ON_STORE_ERROR", None),
            ],
            || {
                let defaults = policy(&["test"])?;
                assert_eq!(defaults.on_no_permissions(), PolicyAction::Allow);
                assert_eq!(defaults.on_store_error(), PolicyAction::Allow);

                let strict = policy(&["test", "--on-no-permissions", "DENY"])?;
                assert_eq!(strict.on_no_permissions(), PolicyAction::Deny);
                assert_eq!(strict.on_store_error(), PolicyAction::Allow);
                Ok(())
            },
        )
    }

    #[test]
    fn env_and_invalid_words() {
        temp_env::with_vars(
            [
                ("GATEWARDEN_ON_NO_PERMISSIONS", None::<&str>),
                ("GATEWARDEN_ON_STORE_ERROR", Some("deny")),
            ],
            || {
                let parsed = policy(&["test"]).map(|p| p.on_store_error()).ok();
                assert_eq!(parsed, Some(PolicyAction::Deny));
                assert!(policy(&["test", "--on-no-permissions", "maybe"]).is_err());
            },
        );
    }
}
