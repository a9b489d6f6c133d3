//! # Gardisto (Forward Authentication Gateway)
//!
//! `gardisto` is an authentication and authorization front door for reverse
//! proxies. The proxy delegates the allow/deny decision for every protected
//! request to a single verification endpoint; `gardisto` answers with
//! "authorized", "forbidden", or "authenticate first", derived from
//! configured access-control rules and the caller's proven identity.
//!
//! ## Access Control
//!
//! Rules are an **ordered** list matched on domain, path, subject, and
//! source network. Declaration order is precedence: the first rule whose
//! constraints all hold decides the required policy, and the configured
//! default policy applies when no rule matches. Unknown policy names and a
//! missing default resolve to `deny` — the engine always fails closed.
//!
//! ## Verification
//!
//! Callers prove their identity over one of two mutually exclusive
//! channels: `Proxy-Authorization` Basic credentials (always one-factor,
//! stateless) or the session cookie issued by the first-factor endpoint.
//! Cookie sessions carry an inactivity timeout; an expired session is
//! destroyed and the request rejected.
//!
//! ## Collaborators
//!
//! Credential storage ([`users::UserProvider`]), session persistence
//! ([`session::SessionStore`]), and brute-force regulation
//! ([`regulation::Regulator`]) are trait objects selected once at startup.
//! The policy engine and decision logic never depend on a concrete variant.

pub mod api;
pub mod authz;
pub mod cli;
pub mod config;
pub mod regulation;
pub mod session;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
