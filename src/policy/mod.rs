//! Routing policy: the resolver contract and its implementations.
//!
//! The proxy core asks a [`PolicyResolver`] which way to send each request
//! and acts on the first directive it can use. Everything else about policy
//! lives behind that trait:
//!
//! - [`DirectResolver`] — no policy source configured; everything direct
//! - [`RuleSet`] — ordered host-pattern rules compiled from TOML
//! - [`RemoteRules`] — a rule set downloaded from a URL, cached on disk,
//!   and refreshed out-of-band
//!
//! Directive lists use the PAC result-string form (`"PROXY host:port;
//! DIRECT"`), so a policy exported from a PAC deployment drops in without
//! translation of its answers.
//!
//! A resolver failure is never fatal to a session: the session falls back
//! to a direct connection.

mod directive;
mod error;
mod remote;
mod resolver;
mod rules;

pub use directive::{parse_directives, Directive};
pub use error::PolicyError;
pub use remote::{RemoteRules, DEFAULT_REFRESH_INTERVAL};
pub use resolver::{DirectResolver, PolicyResolver};
pub use rules::{RuleEntry, RuleSet};
