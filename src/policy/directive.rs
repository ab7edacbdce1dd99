//! Routing directives and PAC result-string parsing.
//!
//! Policy answers are ordered lists of directives in the PAC result form:
//! a semicolon-separated string such as `"PROXY proxy.corp:8080; DIRECT"`.
//! Entry types this proxy cannot act on (`SOCKS`, `HTTPS`, ...) are
//! skipped, matching the contract that the core consumes only the first
//! directive it can act on.

use std::fmt;

use super::error::PolicyError;

/// A single routing directive from a policy answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Connect directly to the origin.
    Direct,
    /// Forward through an upstream HTTP proxy.
    Proxy {
        /// Upstream proxy host.
        host: String,
        /// Upstream proxy port.
        port: u16,
    },
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Direct => write!(f, "DIRECT"),
            Directive::Proxy { host, port } => write!(f, "PROXY {host}:{port}"),
        }
    }
}

/// Parse a PAC result string into an ordered directive list.
///
/// Entries are separated by `;` and matched case-insensitively. Entries of
/// an unrecognized type are skipped; a recognized entry with an unusable
/// host or port is an error. Port defaults to 80 when omitted.
///
/// # Example
///
/// ```
/// use pac_proxy::policy::{parse_directives, Directive};
///
/// let list = parse_directives("PROXY proxy.corp:8080; DIRECT").unwrap();
/// assert_eq!(list.len(), 2);
/// assert_eq!(list[1], Directive::Direct);
/// ```
pub fn parse_directives(input: &str) -> Result<Vec<Directive>, PolicyError> {
    let mut directives = Vec::new();
    for entry in input.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let upper = entry.to_ascii_uppercase();
        if upper == "DIRECT" {
            directives.push(Directive::Direct);
        } else if let Some(rest) = upper.strip_prefix("PROXY") {
            if rest.is_empty() {
                return Err(PolicyError::InvalidDirective(entry.to_string()));
            }
            if !rest.starts_with(char::is_whitespace) {
                // Something like "PROXYFOO"; not a directive type we know
                continue;
            }
            // Take the authority from the original casing, not the uppercased copy
            let authority = entry[entry.len() - rest.len()..].trim();
            directives.push(parse_proxy_authority(authority, entry)?);
        }
        // Unknown types (SOCKS, HTTPS, ...) are skipped
    }
    Ok(directives)
}

fn parse_proxy_authority(authority: &str, entry: &str) -> Result<Directive, PolicyError> {
    if authority.is_empty() {
        return Err(PolicyError::InvalidDirective(entry.to_string()));
    }
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port_str)) if !host.is_empty() => {
            let port = port_str
                .parse()
                .map_err(|_| PolicyError::InvalidDirective(entry.to_string()))?;
            (host.to_string(), port)
        }
        Some(_) => return Err(PolicyError::InvalidDirective(entry.to_string())),
        None => (authority.to_string(), 80),
    };
    Ok(Directive::Proxy { host, port })
}
