//! HTTP handlers for both listeners and the helpers they share.

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod proxy;

use axum::{
    http::{header::LOCATION, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use serde_json::json;
use tracing::error;

use crate::api::state::GatewayState;

/// `302 Found` to `location`.
pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut headers = HeaderMap::new();
            headers.insert(LOCATION, value);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(err) => {
            error!("invalid redirect location {location:?}: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `{"error": message}` with `status`.
pub(crate) fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Absolute URL of the current request as the client sent it:
/// `<external scheme>://<Host header><path?query>`.
pub(crate) fn original_url(state: &GatewayState, headers: &HeaderMap, uri: &Uri) -> String {
    let host = request_host(headers, uri).unwrap_or_default();
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    format!(
        "{}://{}{}",
        state.config().external_scheme(),
        host,
        path_and_query
    )
}

/// `Host` header, falling back to the URI authority (HTTP/2).
pub(crate) fn request_host<'a>(headers: &'a HeaderMap, uri: &'a Uri) -> Option<&'a str> {
    headers
        .get(axum::http::header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .map(str::trim)
        .filter(|host| !host.is_empty())
}

/// Usernames and role names end up in store keys; keep them to a safe alphabet.
pub fn valid_name(name: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._@-]{0,127}$").is_ok_and(|re| re.is_match(name))
}
