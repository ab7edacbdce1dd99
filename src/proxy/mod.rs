//! The proxy core: framing, destination resolution, routing, and relay.
//!
//! A request travels through four stages, one module each:
//!
//! 1. [`framer`] — accumulate bytes until one complete request head
//! 2. [`resolve`] — normalize the target into a destination and URL
//! 3. [`session`] — consult policy and pick a routing decision
//! 4. [`relay`] — establish the outbound leg and copy bytes opaquely
//!
//! [`server`] owns the loopback listener and spawns one session per
//! accepted connection.

pub mod error;
pub mod framer;
pub mod relay;
pub mod resolve;
pub mod server;
pub mod session;

pub use error::{ProxyError, ProxyResult};
pub use framer::{FrameResult, ParsedRequest, RequestFramer, DEFAULT_MAX_HEADER_BYTES};
pub use relay::{RelayPlan, RoutingDecision, TUNNEL_ESTABLISHED};
pub use resolve::{resolve, Destination, ResolvedTarget};
pub use server::{ProxyConfig, ProxyServer, DEFAULT_PORT};
pub use session::{ProxySession, SessionState};
