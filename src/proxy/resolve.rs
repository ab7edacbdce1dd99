//! Destination resolution: from a parsed request to a host:port and the
//! normalized URL used for policy lookup.
//!
//! Resolution applies the Host-header precedence rule (the header overrides
//! the request-line authority, but only after the override has been checked
//! against the self-loop condition), strips scheme-default ports so the
//! lookup URL is scheme/host-only when the port is the default, and
//! enforces the loop guard strictly before any outbound connection attempt.

use std::fmt;

use url::Url;

use super::error::ProxyError;
use super::framer::ParsedRequest;

/// A resolved next-hop endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Hostname, IP literal, or bracketed IPv6 literal.
    pub host: String,
    /// Port number (scheme default when the target left it unspecified).
    pub port: u16,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome of destination resolution.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// The destination for a direct connection.
    pub destination: Destination,
    /// Normalized URL for policy lookup (default ports stripped).
    pub url: Url,
}

impl ResolvedTarget {
    /// The request target in origin-form: path plus optional query, with
    /// scheme and authority stripped.
    pub fn origin_form(&self) -> String {
        let mut s = self.url.path().to_string();
        if s.is_empty() {
            s.push('/');
        }
        if let Some(q) = self.url.query() {
            s.push('?');
            s.push_str(q);
        }
        s
    }
}

/// Resolve the destination and lookup URL for a parsed request.
///
/// Fails with [`ProxyError::MalformedTarget`] when no authority can be
/// determined, and with [`ProxyError::LoopDetected`] when the final
/// destination port equals the proxy's own listening port. The loop check
/// runs here, before any outbound socket is opened.
pub fn resolve(req: &ParsedRequest, listen_port: u16) -> Result<ResolvedTarget, ProxyError> {
    let mut url = parse_target(&req.target)?;

    // Host header overrides the request-line authority, but the override is
    // validated against the loop condition before being trusted.
    if let Some(value) = req.header("host") {
        if let Some((host, explicit_port)) = split_host_port(value) {
            let port = explicit_port.unwrap_or_else(|| scheme_default(&url));
            if port != listen_port {
                url.set_host(Some(&host))
                    .map_err(|_| ProxyError::MalformedTarget(value.to_string()))?;
                let normalized = explicit_port.filter(|p| *p != scheme_default(&url));
                url.set_port(normalized)
                    .map_err(|()| ProxyError::MalformedTarget(value.to_string()))?;
            }
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::MalformedTarget(req.target.clone()))?
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);
    if port == listen_port {
        return Err(ProxyError::LoopDetected { port });
    }

    Ok(ResolvedTarget {
        destination: Destination { host, port },
        url,
    })
}

/// Parse the request-line target as a URL.
///
/// A target without a scheme marker (the authority-only form used by
/// CONNECT, e.g. `example.com:443`) is treated as `http` with the authority
/// taken from the target string itself.
fn parse_target(target: &str) -> Result<Url, ProxyError> {
    let parsed = if target.contains("://") {
        Url::parse(target)
    } else {
        Url::parse(&format!("http://{target}"))
    };
    parsed.map_err(|e| ProxyError::MalformedTarget(format!("{target}: {e}")))
}

/// Default port for the URL's scheme (80 when the scheme is unknown).
fn scheme_default(url: &Url) -> u16 {
    match url.scheme() {
        "https" => 443,
        _ => 80,
    }
}

/// Split a `host[:port]` string, keeping brackets on IPv6 literals.
///
/// Returns `None` when the value cannot be interpreted as an authority.
fn split_host_port(value: &str) -> Option<(String, Option<u16>)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(stripped) = value.strip_prefix('[') {
        // Bracketed IPv6 literal, e.g. [::1]:443
        let end = stripped.find(']')?;
        let host = format!("[{}]", &stripped[..end]);
        let rest = &stripped[end + 1..];
        if rest.is_empty() {
            return Some((host, None));
        }
        let port = rest.strip_prefix(':')?.parse().ok()?;
        return Some((host, Some(port)));
    }
    if let Some((host, port_str)) = value.rsplit_once(':') {
        if host.is_empty() {
            return None;
        }
        let port = port_str.parse().ok()?;
        return Some((host.to_string(), Some(port)));
    }
    Some((value.to_string(), None))
}
