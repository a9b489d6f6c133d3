//! Core types for access-control evaluation.

use std::net::IpAddr;
use url::Url;

/// Level of proof a caller has actually presented.
///
/// Comparison is numeric: `TwoFactor > OneFactor > NotAuthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthenticationLevel {
    NotAuthenticated,
    OneFactor,
    TwoFactor,
}

/// Access requirement attached to a rule or the default policy.
///
/// `Denied` and `Bypass` are absolute; the factor levels require the
/// caller's [`AuthenticationLevel`] to be at least the corresponding value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyLevel {
    Denied,
    Bypass,
    OneFactor,
    TwoFactor,
}

impl PolicyLevel {
    /// Resolve a configured policy name.
    ///
    /// Anything that is not a known name denies, so an operator typo can
    /// never silently open access.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "bypass" => Self::Bypass,
            "one_factor" => Self::OneFactor,
            "two_factor" => Self::TwoFactor,
            // "deny" and every unknown name
            _ => Self::Denied,
        }
    }
}

/// Authorization verdict for a single verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationMatching {
    Authorized,
    Forbidden,
    NotAuthorized,
}

/// The caller being evaluated: identity plus source address.
///
/// An empty username means the caller is anonymous.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    pub username: String,
    pub groups: Vec<String>,
    pub ip: Option<IpAddr>,
}

impl Subject {
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

/// The resource being evaluated, derived from the target URL.
#[derive(Debug, Clone)]
pub struct Object {
    pub domain: String,
    pub path: String,
}

impl Object {
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self {
            domain: url.host_str().unwrap_or_default().to_string(),
            path: url.path().to_string(),
        }
    }
}
