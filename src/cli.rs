//! Command-line interface definitions for pac-proxy.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Policy-directed local HTTP(S) forwarding proxy.
///
/// pac-proxy listens on loopback, accepts plain HTTP requests and CONNECT
/// tunnels from local clients, and routes each one per a host-pattern rules
/// file: either directly to the origin or through an upstream proxy. The
/// rules file may live at a URL, in which case it is cached on disk and
/// refreshed periodically.
#[derive(Parser, Debug)]
#[command(name = "pac-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// URL of the remote rules file.
    ///
    /// A TOML document mapping host patterns to directive lists in the PAC
    /// result form ("PROXY host:port; DIRECT"). Downloaded at startup,
    /// cached on disk, and refreshed on an interval. Omit to route from
    /// the config file (or everything direct).
    pub rules_url: Option<String>,

    /// Port to listen on (loopback only).
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Route every request through one upstream proxy.
    ///
    /// Shortcut for a rules file whose default is "PROXY HOST:PORT".
    /// Ignored when a rules URL is given.
    #[arg(long = "proxy", value_name = "HOST:PORT")]
    pub proxy: Option<String>,

    /// Minutes between rules refreshes.
    #[arg(long = "refresh-interval", value_name = "MINUTES")]
    pub refresh_interval: Option<u32>,

    /// Upper bound on a request head, in bytes.
    #[arg(long = "max-header-bytes", value_name = "BYTES")]
    pub max_header_bytes: Option<usize>,

    /// Path to additional config file.
    ///
    /// Merged on top of the user config, giving it the highest priority
    /// (except for CLI flags).
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse an upstream proxy string into (host, port).
    ///
    /// Returns None if the format is invalid. IPv6 hosts keep their
    /// brackets: `[::1]:8080` yields host `[::1]`.
    pub fn parse_upstream(upstream: &str) -> Option<(String, u16)> {
        let idx = upstream.rfind(':')?;
        let (host, port) = upstream.split_at(idx);
        let port: u16 = port[1..].parse().ok()?;
        if host.is_empty() {
            return None;
        }
        Some((host.to_string(), port))
    }
}
