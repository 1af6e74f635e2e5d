//! Host-based upstream routing table.

use std::str::FromStr;
use thiserror::Error;
use url::{Position, Url};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpstreamParseError {
    #[error("upstream {0:?} must look like host=destination")]
    MissingSeparator(String),
    #[error("upstream {0:?} has an empty or invalid host")]
    InvalidHost(String),
    #[error("upstream destination {destination:?} is not a valid URL: {source}")]
    InvalidDestination {
        destination: String,
        #[source]
        source: url::ParseError,
    },
    #[error("upstream destination {0:?} must be an http or https URL with a host")]
    UnsupportedDestination(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    host: String,
    destination: Url,
}

impl Upstream {
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn destination(&self) -> &Url {
        &self.destination
    }

    /// Destination scheme and authority followed by the original path and query.
    ///
    /// The destination's own path is not prepended.
    #[must_use]
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!("{}{}", &self.destination[..Position::BeforePath], path_and_query)
    }
}

impl FromStr for Upstream {
    type Err = UpstreamParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, destination) = s
            .split_once('=')
            .ok_or_else(|| UpstreamParseError::MissingSeparator(s.to_string()))?;
        let host = host.trim();
        let destination = destination.trim();

        if host.is_empty() || host.contains(['/', ':', ' ']) {
            return Err(UpstreamParseError::InvalidHost(s.to_string()));
        }

        let url = Url::parse(destination).map_err(|source| {
            UpstreamParseError::InvalidDestination {
                destination: destination.to_string(),
                source,
            }
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(UpstreamParseError::UnsupportedDestination(
                destination.to_string(),
            ));
        }

        Ok(Self {
            host: host.to_string(),
            destination: url,
        })
    }
}

/// Upstreams in configuration order. Lookups are exact on the port-less host.
#[derive(Clone, Debug, Default)]
pub struct UpstreamTable {
    entries: Vec<Upstream>,
}

impl UpstreamTable {
    #[must_use]
    pub fn new(entries: Vec<Upstream>) -> Self {
        Self { entries }
    }

    /// Parse `host=destination` pairs. A later pair for the same host replaces the earlier one.
    ///
    /// # Errors
    /// Returns the first pair that fails to parse.
    pub fn parse<I, S>(pairs: I) -> Result<Self, UpstreamParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<Upstream> = Vec::new();
        for pair in pairs {
            let upstream: Upstream = pair.as_ref().parse()?;
            if let Some(existing) = entries.iter_mut().find(|u| u.host == upstream.host) {
                *existing = upstream;
            } else {
                entries.push(upstream);
            }
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn lookup(&self, host: &str) -> Option<&Upstream> {
        self.entries.iter().find(|upstream| upstream.host == host)
    }

    #[must_use]
    pub fn first_host(&self) -> Option<&str> {
        self.entries.first().map(Upstream::host)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Upstream> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strip a `:port` suffix from a `Host` header value. Bracketed IPv6 keeps its brackets.
#[must_use]
pub fn normalize_host(host: &str) -> &str {
    let host = host.trim();
    if host.starts_with('[') {
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
