//! Drives both listeners over real sockets: log in through the auth listener, then
//! reach an upstream through the proxy listener with the session cookie.

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use gatewarden::{
    access::PermissionSet,
    api::{
        self,
        state::{GatewayConfig, GatewayState},
    },
    store::{MemoryStore, Store, UserRecord},
    totp,
    upstream::UpstreamTable,
};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::oneshot};

struct Gateway {
    proxy: SocketAddr,
    auth: SocketAddr,
    secret: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn echo(headers: HeaderMap, uri: Uri) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
    };
    Json(json!({
        "uri": uri.to_string(),
        "host": header("host"),
        "forwardedHost": header("x-forwarded-host"),
        "forwardedProto": header("x-forwarded-proto"),
        "realIp": header("x-real-ip"),
        "forwardedFor": header("x-forwarded-for"),
        "cookie": header("cookie"),
    }))
}

async fn moved() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/elsewhere")]).into_response()
}

async fn spawn_upstream() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/moved", get(moved))
        .fallback(echo);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(addr)
}

async fn spawn_gateway(upstream: SocketAddr) -> Result<Gateway> {
    let store = Arc::new(MemoryStore::new());
    let secret = totp::generate_secret()?;
    store
        .put_user("alice", &UserRecord::new(secret.clone(), vec!["ops".into()]))
        .await?;
    store
        .set_role_permissions("ops", &["app.lan".to_string(), "dead.lan".to_string()])
        .await?;

    let upstreams = UpstreamTable::parse([
        format!("app.lan=http://{upstream}"),
        format!("other.lan=http://{upstream}"),
        // Nothing listens on the discard port.
        "dead.lan=http://127.0.0.1:9".to_string(),
    ])?;

    let config = GatewayConfig::new("https://auth.lan:8443".to_string());
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let state = Arc::new(
        GatewayState::new(store, upstreams, config, client)
            .with_public_routes(PermissionSet::from_raw(["app.lan/public"])),
    );

    let proxy_listener = TcpListener::bind("127.0.0.1:0").await?;
    let auth_listener = TcpListener::bind("127.0.0.1:0").await?;
    let proxy = proxy_listener.local_addr()?;
    let auth = auth_listener.local_addr()?;

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let shutdown = async {
            let _ = rx.await;
        };
        let _ = api::serve(proxy_listener, auth_listener, state, shutdown).await;
    });

    Ok(Gateway {
        proxy,
        auth,
        secret,
        shutdown: Some(tx),
    })
}

fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?)
}

/// Log in and return the `name=value` pair of the session cookie.
async fn login(gateway: &Gateway) -> Result<String> {
    let code = totp::current_code(&gateway.secret)?;
    let response = client()?
        .post(format!("http://{}/login", gateway.auth))
        .form(&[("username", "alice"), ("totp", code.as_str()), ("redirectUrl", "")])
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(ToString::to_string)
        .context("login did not set a session cookie")?;
    Ok(cookie)
}

#[tokio::test]
async fn forwards_authenticated_requests() -> Result<()> {
    let upstream = spawn_upstream().await?;
    let gateway = spawn_gateway(upstream).await?;
    let cookie = login(&gateway).await?;

    let response = client()?
        .get(format!("http://{}/orders?id=7&sort=desc", gateway.proxy))
        .header(header::HOST, "app.lan")
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await?;
    assert_eq!(body["uri"], "/orders?id=7&sort=desc");
    assert_eq!(body["host"], "app.lan");
    assert_eq!(body["forwardedHost"], "app.lan");
    assert_eq!(body["forwardedProto"], "https");
    assert_eq!(body["realIp"], "127.0.0.1");
    assert_eq!(body["forwardedFor"], "127.0.0.1");

    let response = client()?
        .get(format!("http://{}/orders", gateway.proxy))
        .header(header::HOST, "app.lan")
        .header(header::COOKIE, &cookie)
        .header("x-forwarded-for", "203.0.113.7")
        .send()
        .await?;
    let body: Value = response.json().await?;
    assert_eq!(body["realIp"], "203.0.113.7");
    assert_eq!(body["forwardedFor"], "203.0.113.7, 127.0.0.1");
    Ok(())
}

#[tokio::test]
async fn redirects_anonymous_requests_to_login() -> Result<()> {
    let upstream = spawn_upstream().await?;
    let gateway = spawn_gateway(upstream).await?;

    let response = client()?
        .get(format!("http://{}/orders", gateway.proxy))
        .header(header::HOST, "app.lan")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(location.starts_with("https://auth.lan:8443/?redirectUrl="));

    let response = client()?
        .get(format!("http://{}/public/menu", gateway.proxy))
        .header(header::HOST, "app.lan")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn relays_upstream_redirects() -> Result<()> {
    let upstream = spawn_upstream().await?;
    let gateway = spawn_gateway(upstream).await?;
    let cookie = login(&gateway).await?;

    let response = client()?
        .get(format!("http://{}/moved", gateway.proxy))
        .header(header::HOST, "app.lan")
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok()),
        Some("/elsewhere")
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() -> Result<()> {
    let upstream = spawn_upstream().await?;
    let gateway = spawn_gateway(upstream).await?;
    let cookie = login(&gateway).await?;

    let response = client()?
        .get(format!("http://{}/", gateway.proxy))
        .header(header::HOST, "dead.lan")
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    Ok(())
}

#[tokio::test]
async fn denies_hosts_outside_the_role() -> Result<()> {
    let upstream = spawn_upstream().await?;
    let gateway = spawn_gateway(upstream).await?;
    let cookie = login(&gateway).await?;

    let response = client()?
        .get(format!("http://{}/api/orders", gateway.proxy))
        .header(header::HOST, "other.lan")
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await?;
    assert!(body["detail"].as_str().is_some_and(|d| d.starts_with("Access denied")));

    let response = client()?
        .get(format!("http://{}/reports", gateway.proxy))
        .header(header::HOST, "unknown.lan")
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn logout_ends_the_session() -> Result<()> {
    let upstream = spawn_upstream().await?;
    let gateway = spawn_gateway(upstream).await?;
    let cookie = login(&gateway).await?;

    let response = client()?
        .post(format!("http://{}/logout", gateway.auth))
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert!(response.status().is_redirection());

    let response = client()?
        .get(format!("http://{}/orders", gateway.proxy))
        .header(header::HOST, "app.lan")
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    Ok(())
}
