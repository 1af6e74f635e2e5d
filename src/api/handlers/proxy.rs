//! Proxy listener: classify the route, authenticate, check access, forward.
//!
//! Public routes (configured in the permission-rule grammar) skip authentication and
//! access checks. Protected routes run authenticate -> upstream lookup -> access
//! check -> forward. Upstream redirects are relayed, never followed.

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, Extension, Request},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCEPT, CONNECTION,
            CONTENT_TYPE, HOST, REFERER,
        },
        HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{
    auth::{self, session::login_redirect},
    found, original_url, request_host,
};
use crate::{
    access::{self, AccessRequest},
    api::state::GatewayState,
    upstream::{normalize_host, Upstream},
};

pub const ACCESS_DENIED: &str = "Access denied: insufficient permissions for this resource.";

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Connection-scoped headers that must not be forwarded in either direction.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("no upstream configured for host {0}")]
    UpstreamNotConfigured(String),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamNotConfigured(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

/// Fallback handler of the proxy listener.
pub async fn dispatch(
    state: Extension<Arc<GatewayState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    match route(&state, peer, request).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ProxyError::Upstream(_) => error!("{err}"),
                ProxyError::InvalidRequest(_) | ProxyError::UpstreamNotConfigured(_) => {
                    debug!("{err}");
                }
            }
            err.into_response()
        }
    }
}

async fn route(
    state: &GatewayState,
    peer: Option<IpAddr>,
    request: Request,
) -> Result<Response, ProxyError> {
    let host = request_host(request.headers(), request.uri())
        .map(normalize_host)
        .map(str::to_string)
        .ok_or(ProxyError::InvalidRequest("missing Host header"))?;
    let path = request.uri().path().to_string();

    if state.public_routes().matches_request(&host, &path) {
        let upstream = lookup(state, &host)?;
        if request.method() == Method::OPTIONS {
            return Ok(preflight());
        }
        return forward(state, upstream, &host, peer, request).await;
    }

    let session = match auth::authenticate(state, request.headers()).await {
        Ok(session) => session,
        Err(err) => {
            match err {
                auth::SessionError::Store(_) => warn!("treating request as unauthenticated: {err}"),
                auth::SessionError::Missing | auth::SessionError::NotFound => {
                    debug!("redirecting to login: {err}");
                }
            }
            let original = original_url(state, request.headers(), request.uri());
            return Ok(login_redirect(state.config(), &original));
        }
    };

    let upstream = lookup(state, &host)?;

    let referer = request
        .headers()
        .get(REFERER)
        .and_then(|value| value.to_str().ok());
    let access_request = AccessRequest {
        host: &host,
        path: &path,
        referer,
    };
    let decision = access::authorize(
        state.store(),
        state.policy(),
        &session.username,
        &access_request,
    )
    .await;
    if !decision.is_allowed() {
        info!(user = %session.username, host = %host, path = %path, "access denied");
        return Ok(deny(state, request.headers(), &path));
    }

    forward(state, upstream, &host, peer, request).await
}

fn lookup<'a>(state: &'a GatewayState, host: &str) -> Result<&'a Upstream, ProxyError> {
    state
        .upstreams()
        .lookup(host)
        .ok_or_else(|| ProxyError::UpstreamNotConfigured(host.to_string()))
}

/// Answer a CORS preflight without contacting the upstream.
fn preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, PUT, DELETE, OPTIONS"),
            (
                ACCESS_CONTROL_ALLOW_HEADERS,
                "Content-Type, Authorization",
            ),
            (ACCESS_CONTROL_MAX_AGE, "3600"),
        ],
    )
        .into_response()
}

/// API clients get `403` JSON, browsers are sent to the default landing page.
fn wants_json(headers: &HeaderMap, path: &str, api_prefixes: &[String]) -> bool {
    let json_header = [ACCEPT, CONTENT_TYPE].iter().any(|name| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"))
    });
    json_header || api_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

fn deny(state: &GatewayState, headers: &HeaderMap, path: &str) -> Response {
    if wants_json(headers, path, state.config().api_prefixes()) {
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "detail": ACCESS_DENIED })),
        )
            .into_response()
    } else {
        found(&state.external_url(state.default_host(), "/"))
    }
}

/// Client address from proxy headers, first `X-Forwarded-For` entry then `X-Real-IP`.
fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get(X_REAL_IP)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Extend the `X-Forwarded-For` chain with the connecting peer.
fn append_forwarded_for(headers: &mut HeaderMap, peer: Option<IpAddr>) {
    let Some(peer) = peer else {
        return;
    };
    let prior: Vec<&str> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .collect();
    let chain = if prior.is_empty() {
        peer.to_string()
    } else {
        format!("{}, {peer}", prior.join(", "))
    };
    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

fn forwarded_headers(
    state: &GatewayState,
    mut headers: HeaderMap,
    host: &str,
    peer: Option<IpAddr>,
) -> Result<HeaderMap, ProxyError> {
    let client_ip = extract_client_ip(&headers).or_else(|| peer.map(|ip| ip.to_string()));
    strip_hop_by_hop(&mut headers);

    let host_value =
        HeaderValue::from_str(host).map_err(|_| ProxyError::InvalidRequest("invalid Host header"))?;
    headers.insert(HOST, host_value.clone());
    headers.insert(X_FORWARDED_HOST, host_value);
    if let Ok(proto) = HeaderValue::from_str(state.config().external_scheme()) {
        headers.insert(X_FORWARDED_PROTO, proto);
    }
    if let Some(ip) = client_ip.and_then(|ip| HeaderValue::from_str(&ip).ok()) {
        headers.insert(X_REAL_IP, ip);
    }
    append_forwarded_for(&mut headers, peer);
    Ok(headers)
}

async fn forward(
    state: &GatewayState,
    upstream: &Upstream,
    host: &str,
    peer: Option<IpAddr>,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = upstream.target_url(path_and_query);
    let headers = forwarded_headers(state, parts.headers, host, peer)?;

    debug!(method = %parts.method, url = %url, "forwarding");

    let mut builder = state
        .client()
        .request(parts.method, url.as_str())
        .headers(headers);
    if body.size_hint().exact() != Some(0) {
        builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }
    let upstream_response = builder.send().await?;

    let status = upstream_response.status();
    let mut headers = upstream_response.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
