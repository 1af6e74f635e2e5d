//! # Gatewarden (Session-Authenticated Reverse Proxy)
//!
//! `gatewarden` sits in front of internal HTTP services and lets a request through
//! only when it carries a valid session and the user's roles grant the requested
//! host and path.
//!
//! ## Listeners
//!
//! - **Proxy listener:** every request is matched against the public routes, then the
//!   session cookie, then the user's permissions, and finally forwarded to the upstream
//!   selected by the request host.
//! - **Auth listener:** the TOTP login form, logout, the personal dashboard, `/health`
//!   and the bearer-protected admin API with its Swagger UI.
//!
//! ## Sessions
//!
//! Logging in with a username and a 6-digit TOTP code creates a random 64-hex token
//! stored with a sliding TTL. Every authenticated request pushes the expiry forward.
//!
//! ## Permissions
//!
//! A role is a set of permission rules, a user is a set of roles. A rule is either a
//! host (`app.lan`), a path on any host (`/reports`) or a host and path
//! (`app.lan/reports`); a trailing `/*` turns a host-and-path rule into a prefix.
//! When the store cannot be read or a user has no permissions, the configured
//! [`access::AccessPolicy`] decides, failing open by default.

pub mod access;
pub mod api;
pub mod cli;
pub mod store;
pub mod totp;
pub mod upstream;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
