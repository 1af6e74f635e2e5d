//! Backing store for users, roles, role assignments and sessions.
//!
//! Key layout (shared by every backend):
//!
//! - `<token>` -> username, expires with the session TTL
//! - `user:<username>` -> [`UserRecord`] as JSON
//! - `user:roles:<username>` -> set of role names
//! - `role:permissions:<role>` -> set of permission rule strings
//!
//! Every method is a single round trip (or a single atomic pipeline). Callers that
//! combine several calls, like permission resolution, get no transactional view.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod valkey;

pub use memory::MemoryStore;
pub use valkey::ValkeyStore;

pub(crate) const USER_PREFIX: &str = "user:";
pub(crate) const USER_ROLES_PREFIX: &str = "user:roles:";
pub(crate) const ROLE_PERMISSIONS_PREFIX: &str = "role:permissions:";

#[must_use]
pub fn user_key(username: &str) -> String {
    format!("{USER_PREFIX}{username}")
}

#[must_use]
pub fn user_roles_key(username: &str) -> String {
    format!("{USER_ROLES_PREFIX}{username}")
}

#[must_use]
pub fn role_permissions_key(role: &str) -> String {
    format!("{ROLE_PERMISSIONS_PREFIX}{role}")
}

/// Session keys are bare 64-char lowercase hex tokens.
#[must_use]
pub fn is_session_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub totp_secret: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserRecord {
    #[must_use]
    pub fn new(totp_secret: String, roles: Vec<String>) -> Self {
        let mut roles = roles;
        roles.sort();
        roles.dedup();
        Self { totp_secret, roles }
    }
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("totp_secret", &"***")
            .field("roles", &self.roles)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEntry {
    pub token: String,
    pub username: String,
    /// Remaining lifetime in seconds, `-1` when the backend cannot tell.
    pub ttl_seconds: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, username: &str) -> StoreResult<Option<UserRecord>>;
    /// Write the user record and replace its role-assignment set.
    async fn put_user(&self, username: &str, record: &UserRecord) -> StoreResult<()>;
    /// Remove the user record and its role-assignment set. Sessions are left alone.
    async fn delete_user(&self, username: &str) -> StoreResult<()>;
    async fn list_users(&self) -> StoreResult<Vec<String>>;

    async fn user_roles(&self, username: &str) -> StoreResult<Vec<String>>;
    async fn role_permissions(&self, role: &str) -> StoreResult<Vec<String>>;
    /// Replace the rule set of a role. An empty set removes the role.
    async fn set_role_permissions(&self, role: &str, permissions: &[String]) -> StoreResult<()>;
    /// Remove the rule set of a role. Role assignments on users are not touched.
    async fn delete_role(&self, role: &str) -> StoreResult<()>;
    async fn list_roles(&self) -> StoreResult<Vec<String>>;

    async fn put_session(&self, token: &str, username: &str, ttl: Duration) -> StoreResult<()>;
    async fn session_user(&self, token: &str) -> StoreResult<Option<String>>;
    async fn refresh_session(&self, token: &str, ttl: Duration) -> StoreResult<()>;
    async fn delete_session(&self, token: &str) -> StoreResult<()>;
    async fn list_sessions(&self) -> StoreResult<Vec<SessionEntry>>;

    async fn ping(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
