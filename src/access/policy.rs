use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid policy action {0:?}, expected \"allow\" or \"deny\"")]
pub struct PolicyParseError(pub String);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyAction {
    #[default]
    Allow,
    Deny,
}

impl PolicyAction {
    #[must_use]
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl FromStr for PolicyAction {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            _ => Err(PolicyParseError(s.to_string())),
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        })
    }
}

/// What to do when authorization data is missing or unreadable.
///
/// Both default to [`PolicyAction::Allow`] (fail-open).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    on_no_permissions: PolicyAction,
    on_store_error: PolicyAction,
}

impl AccessPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_on_no_permissions(mut self, action: PolicyAction) -> Self {
        self.on_no_permissions = action;
        self
    }

    #[must_use]
    pub const fn with_on_store_error(mut self, action: PolicyAction) -> Self {
        self.on_store_error = action;
        self
    }

    #[must_use]
    pub const fn on_no_permissions(&self) -> PolicyAction {
        self.on_no_permissions
    }

    #[must_use]
    pub const fn on_store_error(&self) -> PolicyAction {
        self.on_store_error
    }
}
