//! Permission rules and sets.
//!
//! A rule is one of `host`, `/path` or `host/path`, optionally ending in `/*`.
//! Rules are parsed once when they leave the store and keep their raw text, which
//! is what gets listed, compared and ordered.

use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;
use tracing::warn;

const WILDCARD_SUFFIX: &str = "/*";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleParseError {
    #[error("permission rule is empty")]
    Empty,
    #[error("permission rule {0:?} contains whitespace")]
    Whitespace(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleScope {
    /// `host`: every path on that host.
    HostOnly { host: String },
    /// `/path`: that path prefix on every host.
    PathOnly { path: String },
    /// `host/path`: that path prefix on that host only.
    HostPath { host: String, path: String },
}

/// What a rule is being matched against.
#[derive(Clone, Copy, Debug)]
pub enum Target<'a> {
    /// A proxied request. Rule text is used literally as a prefix, `/*` included.
    Request { host: &'a str, path: &'a str },
    /// A single permission string. `/*` grants everything below the prefix.
    Permission(&'a str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionRule {
    raw: String,
    scope: RuleScope,
    wildcard: bool,
}

impl PermissionRule {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub const fn scope(&self) -> &RuleScope {
        &self.scope
    }

    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    #[must_use]
    pub fn matches(&self, target: Target<'_>) -> bool {
        match target {
            Target::Request { host, path } => match &self.scope {
                RuleScope::HostPath {
                    host: rule_host,
                    path: rule_path,
                } => rule_host == host && path.starts_with(rule_path.as_str()),
                RuleScope::PathOnly { path: rule_path } => path.starts_with(rule_path.as_str()),
                RuleScope::HostOnly { host: rule_host } => rule_host == host,
            },
            Target::Permission(candidate) => {
                if self.raw == candidate {
                    return true;
                }
                if !self.wildcard {
                    return false;
                }
                let prefix = &self.raw[..self.raw.len() - WILDCARD_SUFFIX.len()];
                candidate
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

impl FromStr for PermissionRule {
    type Err = RuleParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(RuleParseError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(RuleParseError::Whitespace(raw.to_string()));
        }

        // A leading `/` wins over the host/path split.
        let scope = if raw.starts_with('/') {
            RuleScope::PathOnly {
                path: raw.to_string(),
            }
        } else if let Some((host, rest)) = raw.split_once('/') {
            RuleScope::HostPath {
                host: host.to_string(),
                path: format!("/{rest}"),
            }
        } else {
            RuleScope::HostOnly {
                host: raw.to_string(),
            }
        };

        Ok(Self {
            raw: raw.to_string(),
            scope,
            wildcard: raw.ends_with(WILDCARD_SUFFIX),
        })
    }
}

impl fmt::Display for PermissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Deduplicated rules, ordered by their raw text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionSet {
    rules: BTreeMap<String, PermissionRule>,
}

impl PermissionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `raw` rules into a set. Unparseable entries are logged and skipped.
    pub fn from_raw<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        set.extend_raw(raw);
        set
    }

    pub fn extend_raw<I, S>(&mut self, raw: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in raw {
            let entry = entry.as_ref();
            match entry.parse::<PermissionRule>() {
                Ok(rule) => {
                    self.rules.insert(rule.raw.clone(), rule);
                }
                Err(err) => warn!("skipping permission rule: {err}"),
            }
        }
    }

    pub fn insert(&mut self, rule: PermissionRule) {
        self.rules.insert(rule.raw.clone(), rule);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PermissionRule> {
        self.rules.values()
    }

    #[must_use]
    pub fn first(&self) -> Option<&PermissionRule> {
        self.rules.values().next()
    }

    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    /// First structural match wins. Static assets and empty sets are the matcher's job.
    #[must_use]
    pub fn matches_request(&self, host: &str, path: &str) -> bool {
        self.iter()
            .any(|rule| rule.matches(Target::Request { host, path }))
    }

    /// Exact permission check with `/*` wildcards.
    #[must_use]
    pub fn grants(&self, permission: &str) -> bool {
        self.iter()
            .any(|rule| rule.matches(Target::Permission(permission)))
    }
}
