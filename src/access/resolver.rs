//! Effective permissions: the union of the rule sets of every role a user holds.
//!
//! Resolution is not cached and not transactional; each role is read separately.

use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::{policy::PolicyAction, rule::PermissionSet};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to read roles of user {username}")]
    Roles {
        username: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to read permissions of role {role}")]
    Role {
        role: String,
        #[source]
        source: StoreError,
    },
}

/// Resolve the effective permission set of `username`.
///
/// A user without roles, or without a record at all, resolves to an empty set.
/// A failing role lookup is skipped when `on_store_error` is allow.
///
/// # Errors
/// Returns [`ResolveError::Roles`] if the role assignments cannot be read, and
/// [`ResolveError::Role`] if a role cannot be read while `on_store_error` is deny.
#[instrument(skip(store))]
pub async fn resolve(
    store: &dyn Store,
    username: &str,
    on_store_error: PolicyAction,
) -> Result<PermissionSet, ResolveError> {
    let roles = store
        .user_roles(username)
        .await
        .map_err(|source| ResolveError::Roles {
            username: username.to_string(),
            source,
        })?;

    let mut permissions = PermissionSet::new();
    for role in roles {
        match store.role_permissions(&role).await {
            Ok(rules) => permissions.extend_raw(rules),
            Err(source) if on_store_error.is_allow() => {
                warn!(role = %role, "skipping role: {source}");
            }
            Err(source) => return Err(ResolveError::Role { role, source }),
        }
    }

    debug!(count = permissions.len(), "resolved permissions");
    Ok(permissions)
}
