//! `GET /dashboard`: the destinations a signed-in user can open.

use axum::{
    extract::Extension,
    http::{HeaderMap, Uri},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, warn};
use utoipa::ToSchema;

use super::{
    auth::{self, session::login_redirect},
    original_url,
};
use crate::{
    access::{resolve, PermissionSet, RuleScope},
    api::state::GatewayState,
};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct DashboardLink {
    pub title: String,
    pub url: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Dashboard {
    pub username: String,
    pub links: Vec<DashboardLink>,
}

#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Links derived from the caller's permissions.", body = Dashboard),
        (status = 302, description = "No valid session, redirected to the login form."),
    ),
    tag = "dashboard"
)]
/// Lists one link per distinct destination the caller's permissions reach.
pub async fn dashboard(
    state: Extension<Arc<GatewayState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let session = match auth::authenticate(&state, &headers).await {
        Ok(session) => session,
        Err(err) => {
            debug!("dashboard requires login: {err}");
            return login_redirect(state.config(), &original_url(&state, &headers, &uri));
        }
    };

    let permissions =
        match resolve(state.store(), &session.username, state.policy().on_store_error()).await {
            Ok(permissions) => permissions,
            Err(err) => {
                warn!("dashboard without permissions: {err}");
                PermissionSet::new()
            }
        };

    Json(Dashboard {
        links: links(&state, &permissions),
        username: session.username,
    })
    .into_response()
}

fn links(state: &GatewayState, permissions: &PermissionSet) -> Vec<DashboardLink> {
    let mut seen = HashSet::new();
    permissions
        .iter()
        .filter_map(|rule| {
            let (host, path) = match rule.scope() {
                RuleScope::PathOnly { path } => (state.default_host(), path.as_str()),
                RuleScope::HostPath { host, path } => (host.as_str(), path.as_str()),
                RuleScope::HostOnly { host } => (host.as_str(), "/"),
            };
            let url = state.external_url(host, path);
            seen.insert(url.clone()).then(|| DashboardLink {
                title: format_title(host, path),
                url,
            })
        })
        .collect()
}

/// `/` is titled after the host, anything else after its first path segment.
fn format_title(host: &str, path: &str) -> String {
    let segment = path.trim_start_matches('/').split('/').next().unwrap_or_default();
    if segment.is_empty() {
        return host.to_string();
    }
    let mut chars = segment.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{handlers::auth::session::generate_session_token, state::GatewayConfig},
        store::{MemoryStore, Store, UserRecord},
        upstream::UpstreamTable,
    };
    use axum::{
        body::to_bytes,
        http::{header::COOKIE, HeaderValue, StatusCode},
    };
    use std::time::Duration;

    #[test]
    fn titles() {
        assert_eq!(format_title("app.lan", "/"), "app.lan");
        assert_eq!(format_title("app.lan", "/menu"), "Menu");
        assert_eq!(format_title("app.lan", "/REPORTS/daily"), "Reports");
        assert_eq!(format_title("app.lan", "/waiter/"), "Waiter");
    }

    fn state(store: Arc<MemoryStore>) -> anyhow::Result<Arc<GatewayState>> {
        Ok(Arc::new(GatewayState::new(
            store,
            UpstreamTable::parse(["app.lan=http://127.0.0.1:1"])?,
            GatewayConfig::new("https://auth.lan".to_string())
                .with_external_port(9443)
                .with_session_cookie_name("gw".to_string()),
            reqwest::Client::new(),
        )))
    }

    #[test]
    fn links_are_deduplicated() -> anyhow::Result<()> {
        let state = state(Arc::new(MemoryStore::new()))?;
        let permissions =
            PermissionSet::from_raw(["app.lan/menu", "/menu", "b.lan", "b.lan/"]);

        let links = links(&state, &permissions);

        assert_eq!(
            links,
            vec![
                DashboardLink {
                    title: "Menu".into(),
                    url: "https://app.lan:9443/menu".into()
                },
                DashboardLink {
                    title: "b.lan".into(),
                    url: "https://b.lan:9443/".into()
                },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn requires_session() -> anyhow::Result<()> {
        let state = state(Arc::new(MemoryStore::new()))?;
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("auth.lan"));

        let response = dashboard(Extension(state), headers, "/dashboard".parse()?).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn lists_links_for_session() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        store
            .put_user("alice", &UserRecord::new("S".into(), vec!["ops".into()]))
            .await?;
        store
            .set_role_permissions("ops", &["/board".into(), "b.lan".into()])
            .await?;
        let token = generate_session_token()?;
        store
            .put_session(&token, "alice", Duration::from_secs(60))
            .await?;
        let state = state(store)?;
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("gw={token}"))?);

        let response = dashboard(Extension(state), headers, "/dashboard".parse()?).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let dashboard: Dashboard = serde_json::from_slice(&body)?;
        assert_eq!(dashboard.username, "alice");
        assert_eq!(
            dashboard.links,
            vec![
                DashboardLink {
                    title: "Board".into(),
                    url: "https://app.lan:9443/board".into()
                },
                DashboardLink {
                    title: "b.lan".into(),
                    url: "https://b.lan:9443/".into()
                },
            ]
        );
        Ok(())
    }
}
