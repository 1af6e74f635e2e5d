use crate::{
    api::state::GatewayConfig,
    cli::{
        actions::{server::Args, Action},
        commands::{access, admin, listen, routing, session, store},
    },
};
use anyhow::Result;

/// Turn parsed arguments into the server [`Action`].
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let listen = listen::Options::parse(matches)?;
    let routing = routing::Options::parse(matches)?;
    let store = store::Options::parse(matches)?;
    let session = session::Options::parse(matches)?;
    let policy = access::parse(matches)?;

    let config = GatewayConfig::new(session.login_url)
        .with_external_scheme(listen.external_scheme)
        .with_external_port(listen.external_port)
        .with_default_host(routing.default_host)
        .with_session_cookie_name(session.cookie_name)
        .with_session_cookie_domain(session.cookie_domain)
        .with_session_ttl(session.ttl)
        .with_api_prefixes(routing.api_prefixes)
        .with_admin_token(admin::parse(matches))
        .with_totp_issuer(session.totp_issuer);

    Ok(Action::Server(Args {
        proxy_port: listen.proxy_port,
        auth_port: listen.auth_port,
        store,
        upstreams: routing.upstreams,
        public_routes: routing.public_routes,
        policy,
        config,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{access::PolicyAction, cli::commands};
    use std::time::Duration;

    const CLEAR: [(&str, Option<&str>); 10] = [
        ("GATEWARDEN_UPSTREAMS", None),
        ("GATEWARDEN_PROXY_PORT", None),
        ("GATEWARDEN_AUTH_PORT", None),
        ("GATEWARDEN_EXTERNAL_PORT", None),
        ("GATEWARDEN_STORE_URL", None),
        ("GATEWARDEN_LOGIN_URL", None),
        ("GATEWARDEN_SESSION_TTL_SECONDS", None),
        ("GATEWARDEN_ADMIN_TOKEN", None),
        ("GATEWARDEN_ON_NO_PERMISSIONS", None),
        ("GATEWARDEN_DEFAULT_HOST", None),
    ];

    #[test]
    fn builds_server_action() -> Result<()> {
        temp_env::with_vars(CLEAR, || {
            let matches = commands::new().try_get_matches_from(vec![
                "gatewarden",
                "--upstream",
                "app.lan=http://127.0.0.1:3000",
                "--proxy-port",
                "9000",
                "--store-url",
                "memory://",
                "--login-url",
                "https://auth.lan:8443/",
                "--session-ttl-seconds",
                "60",
                "--on-no-permissions",
                "deny",
            ])?;

            let Action::Server(args) = handler(&matches)?;
            assert_eq!(args.proxy_port, 9000);
            assert_eq!(args.auth_port, 8443);
            assert!(args.store.is_memory());
            assert_eq!(args.upstreams.first_host(), Some("app.lan"));
            assert!(args.public_routes.is_empty());
            assert_eq!(args.policy.on_no_permissions(), PolicyAction::Deny);
            assert_eq!(args.config.login_url(), "https://auth.lan:8443");
            assert_eq!(args.config.external_port(), 9000);
            assert_eq!(args.config.session_ttl(), Duration::from_secs(60));
            assert!(args.config.admin_token().is_none());
            Ok(())
        })
    }

    #[test]
    fn rejects_invalid_policy() {
        temp_env::with_vars(CLEAR, || {
            let matches = commands::new().try_get_matches_from(vec![
                "gatewarden",
                "--upstream",
                "app.lan=http://127.0.0.1:3000",
                "--on-store-error",
                "sometimes",
            ]);
            assert!(matches.map(|m| handler(&m).is_err()).unwrap_or(false));
        });
    }
}
