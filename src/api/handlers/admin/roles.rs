//! Role administration. A role exists as long as its permission set is non-empty.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::info;

use super::{
    json_body, require_admin, store_failure,
    types::{CreateRoleRequest, ErrorResponse, MessageResponse, RoleResponse, UpdateRoleRequest},
};
use crate::{
    access::PermissionRule,
    api::{
        handlers::{json_error, valid_name},
        state::GatewayState,
    },
};

/// Parse every rule, then return them sorted and deduplicated.
fn validated_permissions(permissions: &[String]) -> Result<Vec<String>, Response> {
    if permissions.is_empty() {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "a role needs at least one permission",
        ));
    }
    let mut rules = Vec::with_capacity(permissions.len());
    for raw in permissions {
        match raw.parse::<PermissionRule>() {
            Ok(rule) => rules.push(rule.as_str().to_string()),
            Err(err) => return Err(json_error(StatusCode::BAD_REQUEST, err.to_string())),
        }
    }
    rules.sort();
    rules.dedup();
    Ok(rules)
}

#[utoipa::path(
    get,
    path = "/api/admin/roles",
    responses(
        (status = 200, description = "All roles with their permissions.", body = [RoleResponse]),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn list_roles(headers: HeaderMap, state: Extension<Arc<GatewayState>>) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }

    let names = match state.store().list_roles().await {
        Ok(names) => names,
        Err(err) => return store_failure(&err),
    };

    let mut roles = Vec::with_capacity(names.len());
    for name in names {
        match state.store().role_permissions(&name).await {
            Ok(permissions) if permissions.is_empty() => {}
            Ok(mut permissions) => {
                permissions.sort();
                roles.push(RoleResponse { name, permissions });
            }
            Err(err) => return store_failure(&err),
        }
    }

    Json(roles).into_response()
}

#[utoipa::path(
    post,
    path = "/api/admin/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created.", body = RoleResponse),
        (status = 400, description = "Invalid name or permission rule.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 409, description = "Role already exists.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn create_role(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    payload: Result<Json<CreateRoleRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if !valid_name(&request.name) {
        return json_error(StatusCode::BAD_REQUEST, "invalid role name");
    }
    let permissions = match validated_permissions(&request.permissions) {
        Ok(permissions) => permissions,
        Err(response) => return response,
    };

    match state.store().role_permissions(&request.name).await {
        Ok(existing) if !existing.is_empty() => {
            return json_error(StatusCode::CONFLICT, "role already exists");
        }
        Ok(_) => {}
        Err(err) => return store_failure(&err),
    }

    if let Err(err) = state
        .store()
        .set_role_permissions(&request.name, &permissions)
        .await
    {
        return store_failure(&err);
    }
    info!(role = %request.name, ?permissions, "role created");

    (
        StatusCode::CREATED,
        Json(RoleResponse {
            name: request.name,
            permissions,
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/api/admin/roles/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 200, description = "Role detail.", body = RoleResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 404, description = "Role not found.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn get_role(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    match state.store().role_permissions(&name).await {
        Ok(permissions) if permissions.is_empty() => {
            json_error(StatusCode::NOT_FOUND, "role not found")
        }
        Ok(mut permissions) => {
            permissions.sort();
            Json(RoleResponse { name, permissions }).into_response()
        }
        Err(err) => store_failure(&err),
    }
}

#[utoipa::path(
    put,
    path = "/api/admin/roles/{name}",
    request_body = UpdateRoleRequest,
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 200, description = "Permissions replaced.", body = RoleResponse),
        (status = 400, description = "Invalid permission rule, or an empty set.", body = ErrorResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
        (status = 404, description = "Role not found.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
/// Replaces the permission set. Use `DELETE` to remove a role.
pub async fn update_role(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    Path(name): Path<String>,
    payload: Result<Json<UpdateRoleRequest>, JsonRejection>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    let request = match json_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let permissions = match validated_permissions(&request.permissions) {
        Ok(permissions) => permissions,
        Err(response) => return response,
    };

    match state.store().role_permissions(&name).await {
        Ok(existing) if existing.is_empty() => {
            return json_error(StatusCode::NOT_FOUND, "role not found");
        }
        Ok(_) => {}
        Err(err) => return store_failure(&err),
    }

    if let Err(err) = state.store().set_role_permissions(&name, &permissions).await {
        return store_failure(&err);
    }
    info!(role = %name, ?permissions, "role updated");

    Json(RoleResponse { name, permissions }).into_response()
}

#[utoipa::path(
    delete,
    path = "/api/admin/roles/{name}",
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 200, description = "Role deleted. Users keep the dangling assignment.", body = MessageResponse),
        (status = 401, description = "Missing or invalid admin token.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn delete_role(
    headers: HeaderMap,
    state: Extension<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }
    if let Err(err) = state.store().delete_role(&name).await {
        return store_failure(&err);
    }
    info!(role = %name, "role deleted");
    Json(MessageResponse::new(format!("role {name} deleted"))).into_response()
}
