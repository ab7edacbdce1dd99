//! Outbound relay establishment and bidirectional byte copy.
//!
//! Once a routing decision exists, the relay has three shapes:
//!
//! - **Upstream proxy**: the original request bytes (absolute-form target,
//!   Host header and all) are forwarded unchanged to the upstream proxy.
//! - **Tunnel** (CONNECT resolved direct): the CONNECT request itself is
//!   consumed; after a successful connect the client receives exactly
//!   `HTTP/1.0 200 OK\r\n\r\n` before any relayed byte. On connect failure
//!   the session closes with no response.
//! - **Direct** (any other method): the request line is rewritten to
//!   origin-form, the rest of the header block is left intact, and the
//!   result goes to the resolved destination.
//!
//! After establishment the relay is an opaque byte copy: no reparsing,
//! and closing either leg promptly closes the other.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use super::error::ProxyError;
use super::framer::ParsedRequest;
use super::resolve::{Destination, ResolvedTarget};

/// The response synthesized to the client when a tunnel is established.
pub const TUNNEL_ESTABLISHED: &[u8] = b"HTTP/1.0 200 OK\r\n\r\n";

/// How a request leaves the proxy. Produced exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Connect to the resolved destination and forward an origin-form
    /// rewrite of the request.
    Direct,
    /// Connect to an upstream proxy and forward the request verbatim.
    UpstreamProxy(Destination),
    /// CONNECT resolved direct: open a raw tunnel to the destination.
    Tunnel,
}

/// Everything the relay needs to execute one routing decision.
#[derive(Debug)]
pub struct RelayPlan {
    /// The next hop to connect to.
    pub destination: Destination,
    /// Bytes to send to the next hop before relaying begins.
    pub outbound: Vec<u8>,
    /// Bytes to send to the client once the connect succeeds.
    pub greeting: Option<&'static [u8]>,
}

/// Build the relay plan for a routing decision.
///
/// The upstream-proxy destination gets the same loop guard as resolved
/// targets: a plan is never produced for the proxy's own listening port.
pub fn plan(
    decision: &RoutingDecision,
    req: &ParsedRequest,
    resolved: &ResolvedTarget,
    listen_port: u16,
) -> Result<RelayPlan, ProxyError> {
    match decision {
        RoutingDecision::UpstreamProxy(upstream) => {
            if upstream.port == listen_port {
                return Err(ProxyError::LoopDetected { port: upstream.port });
            }
            let mut outbound = Vec::with_capacity(req.raw_header.len() + req.trailing.len());
            outbound.extend_from_slice(&req.raw_header);
            outbound.extend_from_slice(&req.trailing);
            Ok(RelayPlan {
                destination: upstream.clone(),
                outbound,
                greeting: None,
            })
        }
        RoutingDecision::Tunnel => Ok(RelayPlan {
            // The CONNECT request is consumed: only bytes past its
            // terminator travel to the destination.
            destination: resolved.destination.clone(),
            outbound: req.trailing.to_vec(),
            greeting: Some(TUNNEL_ESTABLISHED),
        }),
        RoutingDecision::Direct => Ok(RelayPlan {
            destination: resolved.destination.clone(),
            outbound: rewrite_origin_form(req, resolved),
            greeting: None,
        }),
    }
}

/// Rewrite the request line to origin-form, keeping the remaining header
/// block and any trailing bytes verbatim.
fn rewrite_origin_form(req: &ParsedRequest, resolved: &ResolvedTarget) -> Vec<u8> {
    let request_line = format!("{} {} {}\r\n", req.method, resolved.origin_form(), req.version);
    let raw = &req.raw_header;
    let rest_start = raw
        .iter()
        .position(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(raw.len());

    let mut out =
        Vec::with_capacity(request_line.len() + (raw.len() - rest_start) + req.trailing.len());
    out.extend_from_slice(request_line.as_bytes());
    out.extend_from_slice(&raw[rest_start..]);
    out.extend_from_slice(&req.trailing);
    out
}

/// Open the outbound connection for a relay plan.
///
/// A connect failure returns [`ProxyError::Connect`] with nothing written
/// to the client; the caller closes the session. No retry.
pub async fn connect(plan: &RelayPlan) -> Result<TcpStream, ProxyError> {
    let addr = plan.destination.to_string();
    TcpStream::connect(&addr)
        .await
        .map_err(|source| ProxyError::Connect { addr, source })
}

/// Exchange the pending bytes, then copy bidirectionally until either side
/// closes.
///
/// The tunnel greeting (when present) reaches the client before any other
/// byte; the pending outbound bytes reach the next hop before relaying.
pub async fn run(
    client: &mut TcpStream,
    upstream: &mut TcpStream,
    plan: &RelayPlan,
) -> Result<(), ProxyError> {
    debug!("Relay established to {}", plan.destination);
    if let Some(greeting) = plan.greeting {
        client.write_all(greeting).await?;
    }
    if !plan.outbound.is_empty() {
        upstream.write_all(&plan.outbound).await?;
    }

    splice(client, upstream).await
}

/// Opaque bidirectional copy with paired teardown.
///
/// Whichever direction finishes first ends the relay; both write halves
/// are shut down so neither leg lingers.
async fn splice(client: &mut TcpStream, upstream: &mut TcpStream) -> Result<(), ProxyError> {
    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();

    let result = tokio::select! {
        r = tokio::io::copy(&mut client_read, &mut upstream_write) => r,
        r = tokio::io::copy(&mut upstream_read, &mut client_write) => r,
    };

    // Paired teardown: one leg closing closes the other
    let _ = client_write.shutdown().await;
    let _ = upstream_write.shutdown().await;

    match result {
        Ok(bytes) => {
            debug!("Relay closed after {bytes} bytes in final direction");
            Ok(())
        }
        Err(e) => {
            let err: ProxyError = e.into();
            if err.is_benign_disconnect() {
                debug!("Relay ended: {err}");
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}
