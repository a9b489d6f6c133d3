//! Pure matchers for the four rule dimensions: subject, network, domain,
//! and resource path.

use anyhow::{bail, Context, Result};
use ipnetwork::IpNetwork;
use regex::Regex;
use std::net::IpAddr;

use super::types::Subject;

/// Compiled subject constraint of a rule.
#[derive(Debug, Clone)]
pub enum SubjectMatcher {
    /// Empty subject field: matches every caller.
    Any,
    User(String),
    Group(String),
}

impl SubjectMatcher {
    /// Parse a configured subject descriptor.
    ///
    /// Whitespace around the name is trimmed, so `user: john` matches the
    /// username `john`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::Any);
        }
        if let Some(name) = trimmed.strip_prefix("user:") {
            let name = name.trim();
            if name.is_empty() {
                bail!("subject `{raw}` is missing a username");
            }
            return Ok(Self::User(name.to_string()));
        }
        if let Some(name) = trimmed.strip_prefix("group:") {
            let name = name.trim();
            if name.is_empty() {
                bail!("subject `{raw}` is missing a group name");
            }
            return Ok(Self::Group(name.to_string()));
        }
        bail!("invalid subject `{raw}` (expected empty, \"user:<name>\" or \"group:<name>\")");
    }

    #[must_use]
    pub fn matches(&self, subject: &Subject) -> bool {
        match self {
            Self::Any => true,
            Self::User(name) => subject.username == *name,
            Self::Group(name) => subject.groups.iter().any(|group| group == name),
        }
    }
}

/// Compiled network constraint entry.
#[derive(Debug, Clone)]
pub enum NetworkMatcher {
    /// Bare IP entry: matches that exact address only, never a subnet.
    Exact(IpAddr),
    Network(IpNetwork),
}

impl NetworkMatcher {
    /// Parse a configured network entry, CIDR or bare IP.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.contains('/') {
            let network = trimmed
                .parse::<IpNetwork>()
                .with_context(|| format!("invalid network `{raw}`"))?;
            Ok(Self::Network(network))
        } else {
            let addr = trimmed
                .parse::<IpAddr>()
                .with_context(|| format!("invalid IP address `{raw}`"))?;
            Ok(Self::Exact(addr))
        }
    }

    #[must_use]
    pub fn matches(&self, ip: IpAddr) -> bool {
        match self {
            Self::Exact(addr) => *addr == ip,
            Self::Network(network) => network.contains(ip),
        }
    }
}

/// An empty list is a wildcard. A caller without a resolvable source IP
/// satisfies only the wildcard.
#[must_use]
pub fn match_networks(matchers: &[NetworkMatcher], ip: Option<IpAddr>) -> bool {
    if matchers.is_empty() {
        return true;
    }
    let Some(ip) = ip else {
        return false;
    };
    matchers.iter().any(|matcher| matcher.matches(ip))
}

/// Exact hostname equality, or suffix match when the rule domain carries a
/// leading `*`: the target must end with the rule domain minus the `*`, so
/// `*.example.com` matches `a.b.example.com` but not `example.com` itself.
#[must_use]
pub fn match_domain(rule_domain: &str, target: &str) -> bool {
    if let Some(suffix) = rule_domain.strip_prefix('*') {
        return target.ends_with(suffix);
    }
    rule_domain == target
}

/// An empty pattern list matches any path; a non-empty list matches when
/// any pattern does.
#[must_use]
pub fn match_resources(patterns: &[Regex], path: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|pattern| pattern.is_match(path))
}
