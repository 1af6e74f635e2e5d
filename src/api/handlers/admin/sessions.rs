//! Live session listing and revocation.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::info;

use super::{
    require_admin, store_failure,
    types::{ErrorResponse, MessageResponse, SessionResponse},
};
use crate::{
    api::{handlers::json_error, state::GatewayState},
    store::is_session_key,
};

#[utoipa::path(
    get,
    path = "/api/admin/sessions",
    responses(
        (status = 200, description = "Live sessions with remaining TTL.", body = [SessionResponse]),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 503, description = "Store unavailable.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn list_sessions(headers: HeaderMap, state: Extension<Arc<GatewayState>>) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    match state.store().list_sessions().await {
        Ok(sessions) => Json(
            sessions
                .into_iter()
                .map(|entry| SessionResponse {
                    key: entry.token,
                    username: entry.username,
                    ttl: entry.ttl_seconds,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => store_failure(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/admin/sessions/{key}",
    params(("key" = String, Path, description = "Session token, 64 lowercase hex characters")),
    responses(
        (status = 200, description = "Session revoked.", body = MessageResponse),
        (status = 400, description = "Key is not a session token.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
/// Revokes a session. Only session-shaped keys are accepted so user or role records cannot be hit.
pub async fn delete_session(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    Path(key): Path<String>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    if !is_session_key(&key) {
        return json_error(StatusCode::BAD_REQUEST, "invalid session key");
    }
    if let Err(err) = state.store().delete_session(&key).await {
        return store_failure(&err);
    }
    info!("session revoked");
    Json(MessageResponse::new("session deleted")).into_response()
}
