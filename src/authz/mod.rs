//! Access-control policy engine.
//!
//! Configured rules are compiled once at load into [`AccessControl`] and
//! evaluated as a pure function over a [`types::Subject`] and
//! [`types::Object`]. Declaration order is precedence; the engine never
//! errors at evaluation time and degrades to `deny` on anything dubious.

pub mod engine;
pub mod matchers;
pub mod types;

pub use self::engine::{AccessControl, Rule};
