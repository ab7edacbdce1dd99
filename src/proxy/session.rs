//! Per-connection session: negotiate, route, connect, relay.
//!
//! A session owns exactly one accepted client connection and drives it
//! through a linear lifecycle. Errors are scoped to the session: whatever
//! goes wrong here, the connection closes and the server keeps accepting.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::policy::{Directive, PolicyResolver};

use super::error::ProxyError;
use super::framer::{FrameResult, ParsedRequest, RequestFramer};
use super::relay::{self, RoutingDecision};
use super::resolve::{resolve, ResolvedTarget};

/// Where a session is in its lifecycle.
///
/// Transitions are strictly forward: `Negotiating` → `Routing` →
/// `Connecting` → `Relaying` → `Closed`, with any error jumping straight
/// to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading from the client until one complete request head arrives.
    Negotiating,
    /// Request parsed; resolving the destination and consulting policy.
    Routing,
    /// Opening the outbound connection.
    Connecting,
    /// Opaque bidirectional copy in progress.
    Relaying,
    /// Both legs torn down.
    Closed,
}

/// One client connection from accept to teardown.
pub struct ProxySession {
    stream: TcpStream,
    listen_port: u16,
    resolver: Arc<dyn PolicyResolver>,
    max_header_bytes: usize,
    state: SessionState,
}

impl ProxySession {
    /// Wrap an accepted connection.
    pub fn new(
        stream: TcpStream,
        listen_port: u16,
        resolver: Arc<dyn PolicyResolver>,
        max_header_bytes: usize,
    ) -> Self {
        Self {
            stream,
            listen_port,
            resolver,
            max_header_bytes,
            state: SessionState::Negotiating,
        }
    }

    /// Drive the session to completion.
    ///
    /// Returns `Ok(())` for every clean outcome, including a client that
    /// disconnects before sending a full request.
    pub async fn run(mut self) -> Result<(), ProxyError> {
        let req = match self.negotiate().await? {
            Some(req) => req,
            None => {
                debug!("Client closed before completing a request");
                self.transition(SessionState::Closed);
                return Ok(());
            }
        };

        self.transition(SessionState::Routing);
        let resolved = resolve(&req, self.listen_port)?;
        let decision = self.route(&req, &resolved);
        let plan = relay::plan(&decision, &req, &resolved, self.listen_port)?;
        info!("{} {} via {}", req.method, resolved.url, plan.destination);

        self.transition(SessionState::Connecting);
        let mut upstream = relay::connect(&plan).await?;

        self.transition(SessionState::Relaying);
        let result = relay::run(&mut self.stream, &mut upstream, &plan).await;
        self.transition(SessionState::Closed);
        result
    }

    /// Read until a complete request head arrives.
    ///
    /// `None` means the client closed first. Oversized or malformed input
    /// surfaces as an error from the framer.
    async fn negotiate(&mut self) -> Result<Option<ParsedRequest>, ProxyError> {
        let mut framer = RequestFramer::new(self.max_header_bytes);
        let mut buf = [0u8; 4096];
        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            match framer.feed(&buf[..n])? {
                FrameResult::Complete(req) => return Ok(Some(req)),
                FrameResult::Incomplete => {}
            }
        }
    }

    /// Turn the policy answer into a routing decision.
    ///
    /// The first directive in the list decides. An empty list, a `DIRECT`
    /// answer, or a resolver failure all end the same way: direct to the
    /// origin, as a tunnel when the request is CONNECT.
    fn route(&self, req: &ParsedRequest, resolved: &ResolvedTarget) -> RoutingDecision {
        let directives = match self.resolver.find_proxy(&resolved.url) {
            Ok(list) => list,
            Err(e) => {
                warn!("Policy lookup failed for {}, going direct: {e}", resolved.url);
                Vec::new()
            }
        };

        match directives.into_iter().next() {
            Some(Directive::Proxy { host, port }) => {
                RoutingDecision::UpstreamProxy(super::resolve::Destination { host, port })
            }
            Some(Directive::Direct) => direct_decision(req),
            None => {
                debug!("No proxy offered for {}", resolved.url);
                direct_decision(req)
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn direct_decision(req: &ParsedRequest) -> RoutingDecision {
    if req.is_connect() {
        RoutingDecision::Tunnel
    } else {
        RoutingDecision::Direct
    }
}
