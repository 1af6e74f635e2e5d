//! Where to send a user after login when no `redirectUrl` was given.

use tracing::warn;

use crate::{
    access::{resolve, PermissionSet, RuleScope},
    api::state::GatewayState,
};

/// Landing URL derived from the first entry of the user's effective permissions.
pub(crate) async fn landing_url(state: &GatewayState, username: &str) -> String {
    let permissions = match resolve(state.store(), username, state.policy().on_store_error()).await
    {
        Ok(permissions) => permissions,
        Err(err) => {
            warn!("falling back to default landing page: {err}");
            PermissionSet::new()
        }
    };
    landing_from_permissions(state, &permissions)
}

pub(crate) fn landing_from_permissions(state: &GatewayState, permissions: &PermissionSet) -> String {
    let default_host = state.default_host();
    let Some(rule) = permissions.first() else {
        return state.external_url(default_host, "/");
    };

    if rule.as_str().contains("://") {
        return rule.as_str().to_string();
    }

    match rule.scope() {
        RuleScope::PathOnly { path } => state.external_url(default_host, path),
        RuleScope::HostPath { host, path } => state.external_url(host, path),
        RuleScope::HostOnly { host } => state.external_url(host, "/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::state::GatewayConfig,
        store::{MemoryStore, Store, UserRecord},
        upstream::UpstreamTable,
    };
    use std::sync::Arc;

    fn state(store: Arc<MemoryStore>) -> anyhow::Result<GatewayState> {
        Ok(GatewayState::new(
            store,
            UpstreamTable::parse(["app.lan=http://127.0.0.1:1"])?,
            GatewayConfig::new("https://auth.lan:8443".to_string()).with_external_port(9443),
            reqwest::Client::new(),
        ))
    }

    fn landing(raw: &[&str]) -> anyhow::Result<String> {
        let state = state(Arc::new(MemoryStore::new()))?;
        Ok(landing_from_permissions(&state, &PermissionSet::from_raw(raw)))
    }

    #[test]
    fn landing_shapes() -> anyhow::Result<()> {
        assert_eq!(landing(&[])?, "https://app.lan:9443/");
        assert_eq!(landing(&["/reports"])?, "https://app.lan:9443/reports");
        assert_eq!(landing(&["b.lan/menu"])?, "https://b.lan:9443/menu");
        assert_eq!(landing(&["b.lan"])?, "https://b.lan:9443/");
        assert_eq!(
            landing(&["https://elsewhere.lan/x"])?,
            "https://elsewhere.lan/x"
        );
        Ok(())
    }

    #[test]
    fn landing_uses_first_in_order() -> anyhow::Result<()> {
        assert_eq!(landing(&["z.lan", "b.lan"])?, "https://b.lan:9443/");
        Ok(())
    }

    #[tokio::test]
    async fn landing_resolves_user_permissions() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        store
            .put_user("alice", &UserRecord::new("S".into(), vec!["ops".into()]))
            .await?;
        store
            .set_role_permissions("ops", &["ops.lan/board".into()])
            .await?;
        let state = state(store)?;

        assert_eq!(
            landing_url(&state, "alice").await,
            "https://ops.lan:9443/board"
        );
        assert_eq!(landing_url(&state, "ghost").await, "https://app.lan:9443/");
        Ok(())
    }
}
