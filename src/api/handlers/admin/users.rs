//! User administration: enrollment, role assignment, permission inspection.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info};

use super::{
    effective_permissions, json_body, require_admin, store_failure,
    types::{
        CreateUserRequest, CreatedUserResponse, ErrorResponse, MessageResponse, PermissionQuery,
        UpdateUserRequest, UserPermissionsResponse, UserResponse,
    },
};
use crate::{
    api::{
        handlers::{json_error, valid_name},
        state::GatewayState,
    },
    store::UserRecord,
    totp,
};

fn invalid_roles(roles: &[String]) -> Option<&str> {
    roles
        .iter()
        .find(|role| !valid_name(role))
        .map(String::as_str)
}

async fn user_response(
    state: &GatewayState,
    username: &str,
    record: &UserRecord,
) -> Result<UserResponse, Response> {
    let permissions = effective_permissions(state, username).await?;
    Ok(UserResponse {
        username: username.to_string(),
        roles: record.roles.clone(),
        permissions: permissions.to_strings(),
    })
}

async fn load_user(state: &GatewayState, username: &str) -> Result<UserRecord, Response> {
    match state.store().get_user(username).await {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(json_error(StatusCode::NOT_FOUND, "user not found")),
        Err(err) => Err(store_failure(&err)),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All users with roles and effective permissions.", body = [UserResponse]),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
/// Lists users in name order. Records that vanish between listing and loading are skipped.
pub async fn list_users(headers: HeaderMap, state: Extension<Arc<GatewayState>>) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }

    let usernames = match state.store().list_users().await {
        Ok(usernames) => usernames,
        Err(err) => return store_failure(&err),
    };

    let mut users = Vec::with_capacity(usernames.len());
    for username in usernames {
        let record = match state.store().get_user(&username).await {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(err) => return store_failure(&err),
        };
        match user_response(&state, &username, &record).await {
            Ok(user) => users.push(user),
            Err(response) => return response,
        }
    }

    Json(users).into_response()
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created. The TOTP secret is only returned here.", body = CreatedUserResponse),
        (status = 400, description = "Invalid username or role name.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 409, description = "User already exists.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
/// Creates a user with a fresh TOTP secret and returns the enrollment data once.
pub async fn create_user(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    if !valid_name(&request.username) {
        return json_error(StatusCode::BAD_REQUEST, "invalid username");
    }
    if let Some(role) = invalid_roles(&request.roles) {
        return json_error(StatusCode::BAD_REQUEST, format!("invalid role name: {role}"));
    }

    match state.store().get_user(&request.username).await {
        Ok(Some(_)) => return json_error(StatusCode::CONFLICT, "user already exists"),
        Ok(None) => {}
        Err(err) => return store_failure(&err),
    }

    let enrollment = match totp::generate_secret().and_then(|secret| {
        totp::enroll(&secret, state.config().totp_issuer(), &request.username)
    }) {
        Ok(enrollment) => enrollment,
        Err(err) => {
            error!("failed to generate TOTP secret: {err}");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to generate TOTP secret");
        }
    };

    let record = UserRecord::new(enrollment.secret.clone(), request.roles);
    if let Err(err) = state.store().put_user(&request.username, &record).await {
        return store_failure(&err);
    }
    info!(user = %request.username, roles = ?record.roles, "user created");

    let user = match user_response(&state, &request.username, &record).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    (
        StatusCode::CREATED,
        Json(CreatedUserResponse {
            username: user.username,
            roles: user.roles,
            permissions: user.permissions,
            totp_secret: enrollment.secret,
            otpauth_url: enrollment.otpauth_url,
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "User detail.", body = UserResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 404, description = "User not found.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn get_user(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    Path(username): Path<String>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let record = match load_user(&state, &username).await {
        Ok(record) => record,
        Err(response) => return response,
    };
    match user_response(&state, &username, &record).await {
        Ok(user) => Json(user).into_response(),
        Err(response) => response,
    }
}

#[utoipa::path(
    put,
    path = "/api/admin/users/{username}",
    request_body = UpdateUserRequest,
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "Roles replaced.", body = UserResponse),
        (status = 400, description = "Invalid role name.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 404, description = "User not found.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
/// Replaces the role assignment. The TOTP secret is kept.
pub async fn update_user(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    Path(username): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if let Some(role) = invalid_roles(&request.roles) {
        return json_error(StatusCode::BAD_REQUEST, format!("invalid role name: {role}"));
    }

    let existing = match load_user(&state, &username).await {
        Ok(record) => record,
        Err(response) => return response,
    };
    let record = UserRecord::new(existing.totp_secret, request.roles);
    if let Err(err) = state.store().put_user(&username, &record).await {
        return store_failure(&err);
    }
    info!(user = %username, roles = ?record.roles, "user roles updated");

    match user_response(&state, &username, &record).await {
        Ok(user) => Json(user).into_response(),
        Err(response) => response,
    }
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "User deleted. Live sessions expire on their own.", body = MessageResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 404, description = "User not found.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn delete_user(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    Path(username): Path<String>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    if let Err(response) = load_user(&state, &username).await {
        return response;
    }
    if let Err(err) = state.store().delete_user(&username).await {
        return store_failure(&err);
    }
    info!(user = %username, "user deleted");
    Json(MessageResponse::new(format!("user {username} deleted"))).into_response()
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{username}/permissions",
    params(
        ("username" = String, Path, description = "Username"),
        PermissionQuery
    ),
    responses(
        (status = 200, description = "Effective permissions, plus a grant check when `permission` is given.", body = UserPermissionsResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 404, description = "User not found.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn user_permissions(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    Path(username): Path<String>,
    Query(query): Query<PermissionQuery>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    if let Err(response) = load_user(&state, &username).await {
        return response;
    }
    let permissions = match effective_permissions(&state, &username).await {
        Ok(permissions) => permissions,
        Err(response) => return response,
    };

    let granted = query
        .permission
        .as_deref()
        .map(|permission| permissions.grants(permission));

    Json(UserPermissionsResponse {
        username,
        permissions: permissions.to_strings(),
        permission: query.permission,
        granted,
    })
    .into_response()
}
