//! Admin API under `/api/admin`.
//!
//! Flow Overview: every handler first calls [`require_admin`], which checks the
//! `Authorization: Bearer <token>` header against the configured admin token.
//! Without a configured token the whole surface answers `404`.
//!
//! Errors are `{"error": "..."}`, deletions answer `{"message": "..."}`.

pub mod roles;
pub mod sessions;
pub mod totp;
pub mod types;
pub mod users;

use axum::{
    extract::rejection::JsonRejection,
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use tracing::{error, warn};

use super::json_error;
use crate::{
    access::{resolve, PermissionSet, PolicyAction},
    api::state::GatewayState,
    store::StoreError,
};

/// Check the bearer token. `Err` carries the response to return as-is.
pub(crate) fn require_admin(state: &GatewayState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.config().admin_token() else {
        return Err(StatusCode::NOT_FOUND.into_response());
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.expose_secret().as_bytes()) => {
            Ok(())
        }
        _ => {
            warn!("rejected admin request");
            let mut response = json_error(StatusCode::UNAUTHORIZED, "unauthorized");
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, axum::http::HeaderValue::from_static("Bearer"));
            Err(response)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Unwrap a JSON body, mapping extractor rejections to `400`.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| json_error(StatusCode::BAD_REQUEST, rejection.body_text()))
}

pub(crate) fn store_failure(err: &StoreError) -> Response {
    error!("admin store operation failed: {err}");
    match err {
        StoreError::Unavailable(_) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        }
        StoreError::Corrupt { .. } => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "corrupt store record")
        }
    }
}

/// Effective permissions with store errors surfaced instead of skipped.
pub(crate) async fn effective_permissions(
    state: &GatewayState,
    username: &str,
) -> Result<PermissionSet, Response> {
    resolve(state.store(), username, PolicyAction::Deny)
        .await
        .map_err(|err| {
            error!("failed to resolve permissions: {err}");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{api::state::GatewayConfig, store::MemoryStore, upstream::UpstreamTable};
    use axum::http::HeaderValue;
    use secrecy::SecretString;
    use std::sync::Arc;

    pub(crate) const TOKEN: &str = "s3cr3t-admin-token";

    pub(crate) fn state_with(store: Arc<MemoryStore>, token: Option<&str>) -> Arc<GatewayState> {
        Arc::new(GatewayState::new(
            store,
            UpstreamTable::default(),
            GatewayConfig::new("https://auth.lan".to_string())
                .with_admin_token(token.map(|t| SecretString::from(t.to_string()))),
            reqwest::Client::new(),
        ))
    }

    pub(crate) fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    #[test]
    fn constant_time_compare() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn disabled_without_token() {
        let state = state_with(Arc::new(MemoryStore::new()), None);
        let result = require_admin(&state, &bearer(TOKEN));
        assert_eq!(
            result.err().map(|response| response.status()),
            Some(StatusCode::NOT_FOUND)
        );
    }

    #[test]
    fn wrong_or_missing_token() {
        let state = state_with(Arc::new(MemoryStore::new()), Some(TOKEN));

        let wrong = require_admin(&state, &bearer("nope")).err();
        assert_eq!(
            wrong.as_ref().map(Response::status),
            Some(StatusCode::UNAUTHORIZED)
        );
        assert!(wrong
            .as_ref()
            .is_some_and(|response| response.headers().contains_key(WWW_AUTHENTICATE)));

        let missing = require_admin(&state, &HeaderMap::new()).err();
        assert_eq!(
            missing.map(|response| response.status()),
            Some(StatusCode::UNAUTHORIZED)
        );
    }

    #[test]
    fn correct_token() {
        let state = state_with(Arc::new(MemoryStore::new()), Some(TOKEN));
        assert!(require_admin(&state, &bearer(TOKEN)).is_ok());
    }
}
