use crate::{
    access::{AccessPolicy, PermissionSet},
    api::{
        self,
        state::{GatewayConfig, GatewayState},
    },
    cli::{commands::store, telemetry},
    store::{MemoryStore, Store, ValkeyStore},
    upstream::UpstreamTable,
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct Args {
    pub proxy_port: u16,
    pub auth_port: u16,
    pub store: store::Options,
    pub upstreams: UpstreamTable,
    pub public_routes: PermissionSet,
    pub policy: AccessPolicy,
    pub config: GatewayConfig,
}

async fn open_store(options: &store::Options) -> Result<Arc<dyn Store>> {
    if options.is_memory() {
        warn!("Using the in-memory store: users, roles and sessions are lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = ValkeyStore::connect(&options.url, options.timeout)
        .await
        .context("store unreachable at startup")?;
    Ok(Arc::new(store))
}

fn log_startup_args(args: &Args) {
    info!(
        proxy_port = args.proxy_port,
        auth_port = args.auth_port,
        upstreams = args.upstreams.len(),
        public_routes = args.public_routes.len(),
        login_url = args.config.login_url(),
        on_no_permissions = %args.policy.on_no_permissions(),
        on_store_error = %args.policy.on_store_error(),
        admin_api = args.config.admin_token().is_some(),
        "Starting gatewarden"
    );
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store is unreachable, a port cannot be bound or a
/// listener fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = open_store(&args.store).await?;
    store
        .ping()
        .await
        .context("store unreachable at startup")?;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(UPSTREAM_CONNECT_TIMEOUT)
        .user_agent(crate::APP_USER_AGENT)
        .build()
        .context("Failed to build upstream HTTP client")?;

    let state = Arc::new(
        GatewayState::new(store, args.upstreams, args.config, client)
            .with_public_routes(args.public_routes)
            .with_policy(args.policy),
    );

    let proxy_listener = api::bind(args.proxy_port).await?;
    let auth_listener = api::bind(args.auth_port).await?;

    let result = api::serve(proxy_listener, auth_listener, state, api::shutdown_signal()).await;

    telemetry::shutdown_tracer();

    result
}
