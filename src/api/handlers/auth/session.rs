//! Session cookie handling: mint, validate with sliding expiry, revoke.

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn, Span};
use url::form_urlencoded;

use crate::{
    api::{handlers::found, state::GatewayConfig, state::GatewayState},
    store::{is_session_key, StoreError},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no session cookie")]
    Missing,
    #[error("session not found or expired")]
    NotFound,
    #[error("session lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// An authenticated request.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: String,
    pub username: String,
}

/// 256 random bits, hex-encoded.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(hex::encode(bytes))
}

/// Resolve the session cookie to a username and slide its expiry.
///
/// The TTL refresh is best effort; its failure is logged and does not affect the result.
///
/// # Errors
/// Returns [`SessionError`] when the cookie is absent, unknown, expired or unreadable.
pub async fn authenticate(state: &GatewayState, headers: &HeaderMap) -> Result<Session, SessionError> {
    let config = state.config();
    let token = extract_session_token(headers, config.session_cookie_name())
        .ok_or(SessionError::Missing)?;

    // Only token-shaped values can be looked up, so other keys never resolve.
    if !is_session_key(&token) {
        return Err(SessionError::NotFound);
    }

    let username = state
        .store()
        .session_user(&token)
        .await?
        .ok_or(SessionError::NotFound)?;

    if let Err(err) = state
        .store()
        .refresh_session(&token, config.session_ttl())
        .await
    {
        warn!("failed to refresh session TTL: {err}");
    }

    Span::current().record("user", username.as_str());
    debug!("session authenticated");

    Ok(Session { token, username })
}

/// `302` to the login surface, carrying `original` as `redirectUrl`.
pub(crate) fn login_redirect(config: &GatewayConfig, original: &str) -> Response {
    let encoded: String = form_urlencoded::byte_serialize(original.as_bytes()).collect();
    found(&format!("{}/?redirectUrl={encoded}", config.login_url()))
}

/// Build the `HttpOnly; Secure` session cookie.
pub(crate) fn session_cookie(
    config: &GatewayConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl().as_secs();
    let mut cookie = format!(
        "{}={token}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={ttl_seconds}",
        config.session_cookie_name()
    );
    if let Some(domain) = config.session_cookie_domain() {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(config: &GatewayConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age=0",
        config.session_cookie_name()
    );
    if let Some(domain) = config.session_cookie_domain() {
        cookie.push_str(&format!("; Domain={domain}"));
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Delete the session, clear the cookie and send the client to the login surface.
pub async fn logout(state: Extension<Arc<GatewayState>>, headers: HeaderMap) -> impl IntoResponse {
    let config = state.config();
    // Only token-shaped values may reach the store; anything else would name another key.
    if let Some(token) = extract_session_token(&headers, config.session_cookie_name())
        .filter(|token| is_session_key(token))
    {
        if let Err(err) = state.store().delete_session(&token).await {
            error!("failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session was already gone.
    let mut response = found(&format!("{}/", config.login_url()));
    match clear_session_cookie(config) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("failed to build logout cookie: {err}"),
    }
    response
}
