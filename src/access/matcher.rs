//! Allow/deny decision for one request against an effective permission set.

use tracing::debug;
use url::Url;

use super::{policy::PolicyAction, rule::PermissionSet};

pub const STATIC_PREFIX: &str = "/static/";

/// Static assets with these suffixes are always served, whatever the rules say.
pub const STATIC_EXTENSIONS: [&str; 12] = [
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".ttf",
    ".eot",
];

#[derive(Clone, Copy, Debug)]
pub struct AccessRequest<'a> {
    /// Request host without port.
    pub host: &'a str,
    pub path: &'a str,
    /// Only consulted for `/static/` paths.
    pub referer: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny,
}

impl AccessDecision {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl From<bool> for AccessDecision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

#[must_use]
pub fn check(
    permissions: &PermissionSet,
    request: &AccessRequest<'_>,
    on_no_permissions: PolicyAction,
) -> AccessDecision {
    if permissions.is_empty() {
        debug!(policy = %on_no_permissions, "no permissions");
        return on_no_permissions.is_allow().into();
    }

    if request.path.starts_with(STATIC_PREFIX) {
        return check_static(permissions, request).into();
    }

    permissions
        .matches_request(request.host, request.path)
        .into()
}

fn check_static(permissions: &PermissionSet, request: &AccessRequest<'_>) -> bool {
    let referer_allowed = request
        .referer
        .and_then(|referer| Url::parse(referer).ok())
        .is_some_and(|referer| {
            referer
                .host_str()
                .is_some_and(|host| permissions.matches_request(host, referer.path()))
        });
    if referer_allowed {
        return true;
    }

    STATIC_EXTENSIONS
        .iter()
        .any(|extension| request.path.ends_with(extension))
}
