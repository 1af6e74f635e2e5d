//! Gateway configuration and the shared per-process state.

use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};

use crate::{access::AccessPolicy, access::PermissionSet, store::Store, upstream::UpstreamTable};

const DEFAULT_EXTERNAL_SCHEME: &str = "https";
const DEFAULT_EXTERNAL_PORT: u16 = 9443;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_COOKIE_NAME: &str = "gatewarden_session";
const DEFAULT_TOTP_ISSUER: &str = "Gatewarden";
const DEFAULT_API_PREFIX: &str = "/api/";
const FALLBACK_HOST: &str = "localhost";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    login_url: String,
    external_scheme: String,
    external_port: u16,
    default_host: Option<String>,
    session_cookie_name: String,
    session_cookie_domain: Option<String>,
    session_ttl: Duration,
    api_prefixes: Vec<String>,
    admin_token: Option<SecretString>,
    totp_issuer: String,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(login_url: String) -> Self {
        Self {
            login_url: login_url.trim_end_matches('/').to_string(),
            external_scheme: DEFAULT_EXTERNAL_SCHEME.to_string(),
            external_port: DEFAULT_EXTERNAL_PORT,
            default_host: None,
            session_cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            session_cookie_domain: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            api_prefixes: vec![DEFAULT_API_PREFIX.to_string()],
            admin_token: None,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_external_scheme(mut self, scheme: String) -> Self {
        self.external_scheme = scheme;
        self
    }

    #[must_use]
    pub const fn with_external_port(mut self, port: u16) -> Self {
        self.external_port = port;
        self
    }

    #[must_use]
    pub fn with_default_host(mut self, host: Option<String>) -> Self {
        self.default_host = host.filter(|host| !host.is_empty());
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: String) -> Self {
        self.session_cookie_name = name;
        self
    }

    #[must_use]
    pub fn with_session_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.session_cookie_domain = domain.filter(|domain| !domain.is_empty());
        self
    }

    #[must_use]
    pub const fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_api_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.api_prefixes = prefixes;
        self
    }

    #[must_use]
    pub fn with_admin_token(mut self, token: Option<SecretString>) -> Self {
        self.admin_token = token.filter(|token| !token.expose_secret().is_empty());
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    #[must_use]
    pub fn external_scheme(&self) -> &str {
        &self.external_scheme
    }

    #[must_use]
    pub const fn external_port(&self) -> u16 {
        self.external_port
    }

    #[must_use]
    pub fn session_cookie_name(&self) -> &str {
        &self.session_cookie_name
    }

    #[must_use]
    pub fn session_cookie_domain(&self) -> Option<&str> {
        self.session_cookie_domain.as_deref()
    }

    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn api_prefixes(&self) -> &[String] {
        &self.api_prefixes
    }

    #[must_use]
    pub const fn admin_token(&self) -> Option<&SecretString> {
        self.admin_token.as_ref()
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }
}

/// Everything a request handler needs, built once at startup.
pub struct GatewayState {
    store: Arc<dyn Store>,
    upstreams: UpstreamTable,
    public_routes: PermissionSet,
    policy: AccessPolicy,
    config: GatewayConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("store", &self.store.backend_name())
            .field("upstreams", &self.upstreams)
            .field("public_routes", &self.public_routes)
            .field("policy", &self.policy)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GatewayState {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        upstreams: UpstreamTable,
        config: GatewayConfig,
        client: reqwest::Client,
    ) -> Self {
        Self {
            store,
            upstreams,
            public_routes: PermissionSet::new(),
            policy: AccessPolicy::default(),
            config,
            client,
        }
    }

    #[must_use]
    pub fn with_public_routes(mut self, routes: PermissionSet) -> Self {
        self.public_routes = routes;
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[must_use]
    pub const fn upstreams(&self) -> &UpstreamTable {
        &self.upstreams
    }

    #[must_use]
    pub const fn public_routes(&self) -> &PermissionSet {
        &self.public_routes
    }

    #[must_use]
    pub const fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Configured default host, else the first upstream, else `localhost`.
    #[must_use]
    pub fn default_host(&self) -> &str {
        self.config
            .default_host
            .as_deref()
            .or_else(|| self.upstreams.first_host())
            .unwrap_or(FALLBACK_HOST)
    }

    /// `<scheme>://<host>:<external port><path>`
    #[must_use]
    pub fn external_url(&self, host: &str, path: &str) -> String {
        format!(
            "{}://{}:{}{}",
            self.config.external_scheme, host, self.config.external_port, path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn state(config: GatewayConfig, upstreams: &[&str]) -> anyhow::Result<GatewayState> {
        Ok(GatewayState::new(
            Arc::new(MemoryStore::new()),
            UpstreamTable::parse(upstreams)?,
            config,
            reqwest::Client::new(),
        ))
    }

    #[test]
    fn config_defaults() {
        let config = GatewayConfig::new("https://auth.lan:8443/".to_string());
        assert_eq!(config.login_url(), "https://auth.lan:8443");
        assert_eq!(config.external_scheme(), "https");
        assert_eq!(config.session_cookie_name(), "gatewarden_session");
        assert_eq!(config.session_ttl(), Duration::from_secs(86400));
        assert_eq!(config.api_prefixes(), ["/api/".to_string()]);
        assert!(config.admin_token().is_none());
        assert!(config.session_cookie_domain().is_none());
    }

    #[test]
    fn empty_optional_values_are_unset() {
        let config = GatewayConfig::new("https://auth.lan".to_string())
            .with_admin_token(Some(SecretString::from(String::new())))
            .with_session_cookie_domain(Some(String::new()))
            .with_default_host(Some(String::new()));
        assert!(config.admin_token().is_none());
        assert!(config.session_cookie_domain().is_none());
        assert!(config.default_host.is_none());
    }

    #[test]
    fn default_host_fallbacks() -> anyhow::Result<()> {
        let config = GatewayConfig::new("https://auth.lan".to_string());

        let state_a = state(
            config.clone().with_default_host(Some("home.lan".to_string())),
            &["app.lan=http://127.0.0.1:1"],
        )?;
        assert_eq!(state_a.default_host(), "home.lan");

        let state_b = state(config.clone(), &["app.lan=http://127.0.0.1:1"])?;
        assert_eq!(state_b.default_host(), "app.lan");

        let state_c = state(config.with_external_port(443), &[])?;
        assert_eq!(state_c.default_host(), "localhost");
        assert_eq!(
            state_c.external_url("localhost", "/"),
            "https://localhost:443/"
        );
        Ok(())
    }
}
