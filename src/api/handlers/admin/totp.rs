//! TOTP helpers for operators: mint a secret with its QR code, check a code.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;

use super::{
    json_body, require_admin,
    types::{
        ErrorResponse, TotpGenerateRequest, TotpGenerateResponse, TotpValidateRequest,
        TotpValidateResponse,
    },
};
use crate::{
    api::{handlers::json_error, state::GatewayState},
    totp,
};

const DEFAULT_ACCOUNT_NAME: &str = "user";

#[utoipa::path(
    post,
    path = "/api/admin/totp/generate",
    request_body = TotpGenerateRequest,
    responses(
        (status = 200, description = "New secret with provisioning URL and QR code.", body = TotpGenerateResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
/// Generates a secret without storing it. Issuer defaults to the configured one.
pub async fn generate(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    payload: Result<Json<TotpGenerateRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let issuer = request
        .issuer
        .filter(|issuer| !issuer.trim().is_empty())
        .unwrap_or_else(|| state.config().totp_issuer().to_string());
    let account = request
        .account_name
        .filter(|account| !account.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ACCOUNT_NAME.to_string());

    match totp::generate_secret().and_then(|secret| totp::enroll(&secret, &issuer, &account)) {
        Ok(enrollment) => Json(TotpGenerateResponse {
            secret: enrollment.secret,
            qr_code_url: enrollment.otpauth_url,
            qr_code_png: enrollment.qr_code_png,
        })
        .into_response(),
        Err(err) => {
            error!("failed to generate TOTP secret: {err}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate TOTP secret")
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/totp/validate",
    request_body = TotpValidateRequest,
    responses(
        (status = 200, description = "Whether the code is valid for the secret right now.", body = TotpValidateResponse),
        (status = 400, description = "Malformed body.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn validate(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    payload: Result<Json<TotpValidateRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    Json(TotpValidateResponse {
        valid: totp::verify(&request.secret, &request.code),
    })
    .into_response()
}
