//! Request/response types for admin endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub username: String,
    pub roles: Vec<String>,
    /// Effective permissions, the union over every assigned role.
    pub permissions: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Returned once at creation; the secret is never shown again.
#[derive(ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedUserResponse {
    pub username: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub totp_secret: String,
    pub otpauth_url: String,
}

impl std::fmt::Debug for CreatedUserResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedUserResponse")
            .field("username", &self.username)
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateUserRequest {
    pub roles: Vec<String>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionQuery {
    /// Permission string to test against the user's effective permissions.
    pub permission: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserPermissionsResponse {
    pub username: String,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted: Option<bool>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RoleResponse {
    pub name: String,
    pub permissions: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateRoleRequest {
    pub permissions: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub key: String,
    pub username: String,
    /// Remaining seconds, `-1` when unknown.
    pub ttl: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct TotpGenerateRequest {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct TotpGenerateResponse {
    pub secret: String,
    pub qr_code_url: String,
    /// Base64 PNG of the provisioning QR code.
    pub qr_code_png: String,
}

impl std::fmt::Debug for TotpGenerateResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TotpGenerateResponse").finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct TotpValidateRequest {
    pub secret: String,
    pub code: String,
}

impl std::fmt::Debug for TotpValidateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TotpValidateRequest").finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TotpValidateResponse {
    pub valid: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
