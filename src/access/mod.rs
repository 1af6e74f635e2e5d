//! Role-based access control for proxied requests.
//!
//! The flow for one request: [`resolver::resolve`] builds the user's effective
//! [`PermissionSet`], then [`matcher::check`] decides for the request host and path.
//! Missing or unreadable authorization data is handled by [`AccessPolicy`].

pub mod matcher;
pub mod policy;
pub mod resolver;
pub mod rule;

pub use self::matcher::{AccessDecision, AccessRequest};
pub use self::policy::{AccessPolicy, PolicyAction, PolicyParseError};
pub use self::resolver::{resolve, ResolveError};
pub use self::rule::{PermissionRule, PermissionSet, RuleParseError, RuleScope, Target};

use tracing::{debug, warn};

use crate::store::Store;

/// Decide whether `username` may reach `request`.
pub async fn authorize(
    store: &dyn Store,
    policy: &AccessPolicy,
    username: &str,
    request: &AccessRequest<'_>,
) -> AccessDecision {
    match resolve(store, username, policy.on_store_error()).await {
        Ok(permissions) => {
            let decision = matcher::check(&permissions, request, policy.on_no_permissions());
            debug!(
                host = request.host,
                path = request.path,
                ?decision,
                "access checked"
            );
            decision
        }
        Err(err) => {
            warn!(policy = %policy.on_store_error(), "permission lookup failed: {err}");
            policy.on_store_error().is_allow().into()
        }
    }
}
