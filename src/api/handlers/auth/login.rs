//! Login surface: `GET /` renders the form, `POST /login` checks the TOTP code.

use axum::{
    extract::{Extension, Form, Query},
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::{landing::landing_url, page::login_page, session};
use crate::{
    api::{handlers::found, state::GatewayState},
    store::StoreError,
    totp,
};

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("unknown user")]
    IdentityNotFound,
    #[error("invalid one-time code")]
    CodeInvalid,
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("failed to mint session: {0}")]
    Session(#[from] anyhow::Error),
}

impl LoginError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::IdentityNotFound | Self::CodeInvalid => StatusCode::OK,
            Self::Store(_) | Self::Session(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    const fn message(&self) -> &'static str {
        match self {
            Self::IdentityNotFound => "Unknown username.",
            Self::CodeInvalid => "Invalid one-time code.",
            Self::Store(_) | Self::Session(_) => {
                "Sign-in is temporarily unavailable, please try again."
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "redirectUrl", default)]
    pub redirect_url: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub totp: String,
    #[serde(rename = "redirectUrl", default)]
    pub redirect_url: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("username", &self.username)
            .field("redirect_url", &self.redirect_url)
            .finish_non_exhaustive()
    }
}

pub async fn login_form(Query(query): Query<LoginQuery>) -> impl IntoResponse {
    login_page(&query.redirect_url, None)
}

#[instrument(skip_all)]
pub async fn login(state: Extension<Arc<GatewayState>>, Form(form): Form<LoginForm>) -> Response {
    match sign_in(&state, &form).await {
        Ok(token) => {
            info!(user = %form.username, "login succeeded");
            let target = if form.redirect_url.is_empty() {
                landing_url(&state, &form.username).await
            } else {
                form.redirect_url.clone()
            };

            let mut response = found(&target);
            match session::session_cookie(state.config(), &token) {
                Ok(cookie) => {
                    response.headers_mut().insert(SET_COOKIE, cookie);
                }
                Err(err) => error!("failed to build session cookie: {err}"),
            }
            response
        }
        Err(err) => {
            match &err {
                LoginError::IdentityNotFound | LoginError::CodeInvalid => {
                    warn!(user = %form.username, "login rejected: {err}");
                }
                LoginError::Store(_) | LoginError::Session(_) => error!("login failed: {err}"),
            }
            (
                err.status(),
                login_page(&form.redirect_url, Some(err.message())),
            )
                .into_response()
        }
    }
}

/// Verify the credentials and store a new session. Returns the session token.
async fn sign_in(state: &GatewayState, form: &LoginForm) -> Result<String, LoginError> {
    let user = state
        .store()
        .get_user(&form.username)
        .await?
        .ok_or(LoginError::IdentityNotFound)?;

    if !totp::verify(&user.totp_secret, &form.totp) {
        return Err(LoginError::CodeInvalid);
    }

    let token = session::generate_session_token()?;
    state
        .store()
        .put_session(&token, &form.username, state.config().session_ttl())
        .await?;
    Ok(token)
}
