//! pac-proxy: a policy-directed local HTTP(S) forwarding proxy.
//!
//! The proxy listens on loopback, speaks just enough HTTP to read one
//! request head per connection, then routes per a host-pattern rules file:
//! plain requests go to an upstream proxy verbatim or to the origin in
//! origin-form; CONNECT requests either forward to the upstream or become
//! raw tunnels. After routing, the proxy is an opaque byte pipe.
//!
//! # Architecture
//!
//! - **Proxy**: framing, destination resolution, per-session state machine,
//!   accept loop, and the byte relay
//! - **Policy**: the resolver contract, PAC-form directive lists, rule
//!   sets, and the cached remote rules file with out-of-band refresh
//! - **Config**: hierarchical TOML configuration merged with CLI flags

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod policy;
pub mod proxy;
