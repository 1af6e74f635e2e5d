//! HTTP surfaces: the proxy listener and the auth listener.
//!
//! The proxy listener sends every request through [`handlers::proxy::dispatch`].
//! The auth listener serves the login form, logout, the dashboard, health, the
//! admin API and its Swagger UI.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, options, post},
    Extension, Router,
};
use std::{future::Future, future::IntoFuture, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::watch};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;
pub mod state;

pub use openapi::openapi;

use handlers::{auth, health, proxy};
use state::GatewayState;

const REQUEST_ID: &str = "x-request-id";

/// Router of the proxy listener: a single fallback, no own routes.
#[must_use]
pub fn proxy_router(state: Arc<GatewayState>) -> Router {
    with_layers(Router::new().fallback(proxy::dispatch), state)
}

/// Router of the auth listener.
#[must_use]
pub fn auth_router(state: Arc<GatewayState>) -> Router {
    // Build the router from OpenAPI-wired routes, then extend it with non-doc routes.
    let (router, openapi) = openapi::api_router().split_for_parts();
    let router = router
        .route("/", get(auth::login_form))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout).post(auth::logout))
        .route("/health", options(health::health))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi));
    with_layers(router, state)
}

fn with_layers(router: Router, state: Arc<GatewayState>) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id,
        user = tracing::field::Empty,
    )
}

/// Serve both listeners until `shutdown` resolves, then drain in-flight requests.
/// # Errors
/// Returns an error if either listener fails.
pub async fn serve<F>(
    proxy_listener: TcpListener,
    auth_listener: TcpListener,
    state: Arc<GatewayState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown.await;
        info!("Gracefully shutdown");
        let _ = tx.send(true);
    });

    if let Ok(addr) = proxy_listener.local_addr() {
        info!("Proxy listening on {addr}");
    }
    if let Ok(addr) = auth_listener.local_addr() {
        info!("Auth listening on {addr}");
    }

    let proxy = axum::serve(
        proxy_listener,
        proxy_router(state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for(rx.clone()))
    .into_future();

    let auth = axum::serve(
        auth_listener,
        auth_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for(rx))
    .into_future();

    tokio::try_join!(proxy, auth).context("listener failed")?;

    Ok(())
}

/// Bind `[::]:port`.
/// # Errors
/// Returns an error if the port cannot be bound.
pub async fn bind(port: u16) -> Result<TcpListener> {
    TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))
}

async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
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
    use axum::{
        body::to_bytes,
        http::{header, Method, StatusCode},
    };
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(store: Arc<MemoryStore>) -> anyhow::Result<Arc<GatewayState>> {
        Ok(Arc::new(
            GatewayState::new(
                store,
                UpstreamTable::parse(["app.lan=http://127.0.0.1:1"])?,
                GatewayConfig::new("https://auth.lan:8443".to_string())
                    .with_session_cookie_name("gw".to_string()),
                reqwest::Client::new(),
            )
            .with_public_routes(crate::access::PermissionSet::from_raw(["app.lan/public"])),
        ))
    }

    async fn session(store: &MemoryStore, username: &str) -> anyhow::Result<String> {
        let token = handlers::auth::session::generate_session_token()?;
        store
            .put_session(&token, username, Duration::from_secs(60))
            .await?;
        Ok(token)
    }

    #[allow(clippy::unwrap_used)]
    #[tokio::test]
    async fn unauthenticated_proxy_request_redirects_to_login() -> anyhow::Result<()> {
        let app = proxy_router(state(Arc::new(MemoryStore::new()))?);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/orders?id=1")
                    .header(header::HOST, "app.lan:9443")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await?;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert_eq!(
            location,
            "https://auth.lan:8443/?redirectUrl=https%3A%2F%2Fapp.lan%3A9443%2Forders%3Fid%3D1"
        );
        assert!(response.headers().contains_key(REQUEST_ID));
        Ok(())
    }

    #[allow(clippy::unwrap_used)]
    #[tokio::test]
    async fn public_preflight_short_circuits() -> anyhow::Result<()> {
        let app = proxy_router(state(Arc::new(MemoryStore::new()))?);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/public/menu")
                    .header(header::HOST, "app.lan")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await?;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        Ok(())
    }

    #[allow(clippy::unwrap_used)]
    #[tokio::test]
    async fn missing_host_is_bad_request() -> anyhow::Result<()> {
        let app = proxy_router(state(Arc::new(MemoryStore::new()))?);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await?;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[allow(clippy::unwrap_used)]
    #[tokio::test]
    async fn unknown_upstream_after_authentication() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        let token = session(&store, "alice").await?;
        let app = proxy_router(state(store)?);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(header::HOST, "nowhere.lan")
                    .header(header::COOKIE, format!("gw={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await?;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[allow(clippy::unwrap_used)]
    #[tokio::test]
    async fn denial_is_json_for_api_clients_and_redirect_for_browsers() -> anyhow::Result<()> {
        let store = Arc::new(MemoryStore::new());
        store
            .put_user("alice", &UserRecord::new("S".into(), vec!["menu".into()]))
            .await?;
        store
            .set_role_permissions("menu", &["app.lan/menu".into()])
            .await?;
        let token = session(&store, "alice").await?;
        let state = state(store)?;

        let api = proxy_router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/orders")
                    .header(header::HOST, "app.lan")
                    .header(header::COOKIE, format!("gw={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await?;
        assert_eq!(api.status(), StatusCode::FORBIDDEN);
        let body = to_bytes(api.into_body(), usize::MAX).await?;
        let body: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(
            body.get("detail").and_then(serde_json::Value::as_str),
            Some(proxy::ACCESS_DENIED)
        );

        let browser = proxy_router(state)
            .oneshot(
                Request::builder()
                    .uri("/orders")
                    .header(header::HOST, "app.lan")
                    .header(header::ACCEPT, "text/html")
                    .header(header::COOKIE, format!("gw={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await?;
        assert_eq!(browser.status(), StatusCode::FOUND);
        assert_eq!(
            browser
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok()),
            Some("https://app.lan:9443/")
        );
        Ok(())
    }

    #[allow(clippy::unwrap_used)]
    #[tokio::test]
    async fn auth_router_serves_login_form_and_health() -> anyhow::Result<()> {
        let app = auth_router(state(Arc::new(MemoryStore::new()))?);

        let form = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/?redirectUrl=https%3A%2F%2Fapp.lan%2F")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await?;
        assert_eq!(form.status(), StatusCode::OK);
        let body = to_bytes(form.into_body(), usize::MAX).await?;
        assert!(String::from_utf8(body.to_vec())?.contains(r#"value="https://app.lan/""#));

        let health = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await?;
        assert_eq!(health.status(), StatusCode::OK);
        Ok(())
    }

    #[allow(clippy::unwrap_used)]
    #[tokio::test]
    async fn admin_surface_is_hidden_without_token() -> anyhow::Result<()> {
        let app = auth_router(state(Arc::new(MemoryStore::new()))?);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/admin/users")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await?;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }
}
