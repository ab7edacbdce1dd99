//! Configuration schema definitions.
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. Embedded defaults
//! 2. User config: `~/.config/pac-proxy/config.toml`
//! 3. Additional config file (via `--config` flag)
//! 4. CLI flags (highest priority)
//!
//! Every setting has a usable default, so the proxy runs with no config
//! file at all: it listens on the default port and sends everything direct.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::RuleEntry;
use crate::proxy::{DEFAULT_MAX_HEADER_BYTES, DEFAULT_PORT};

/// Default refresh interval in minutes.
pub const DEFAULT_REFRESH_MINS: u32 = 60;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Routing policy settings.
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Config {
    /// Merge another config into this one.
    ///
    /// Rule lists are merged (appended). Scalars are overridden when
    /// non-default.
    pub fn merge(&mut self, other: Config) {
        self.server.merge(other.server);
        self.policy.merge(other.policy);
    }
}

/// Listener settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Loopback port to listen on. 0 = use the default.
    #[serde(default)]
    pub port: u16,

    /// Upper bound on a request head, in bytes. 0 = use the default.
    #[serde(default)]
    pub max_header_bytes: usize,
}

impl ServerConfig {
    fn merge(&mut self, other: ServerConfig) {
        if other.port != 0 {
            self.port = other.port;
        }
        if other.max_header_bytes != 0 {
            self.max_header_bytes = other.max_header_bytes;
        }
    }

    /// The effective listening port.
    pub fn effective_port(&self) -> u16 {
        if self.port != 0 {
            self.port
        } else {
            DEFAULT_PORT
        }
    }

    /// The effective request-head bound.
    pub fn effective_max_header_bytes(&self) -> usize {
        if self.max_header_bytes != 0 {
            self.max_header_bytes
        } else {
            DEFAULT_MAX_HEADER_BYTES
        }
    }
}

/// Routing policy settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// URL of the remote rules file. Empty = none.
    #[serde(default)]
    pub rules_url: String,

    /// Minutes between rules refreshes. 0 = use the default.
    #[serde(default)]
    pub refresh_interval_mins: u32,

    /// Fixed upstream proxy as `HOST:PORT`. Empty = none.
    #[serde(default)]
    pub upstream: String,

    /// Default directive list for hosts no rule matches.
    #[serde(default)]
    pub default: String,

    /// Inline host-pattern rules.
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

impl PolicyConfig {
    fn merge(&mut self, other: PolicyConfig) {
        if !other.rules_url.is_empty() {
            self.rules_url = other.rules_url;
        }
        if other.refresh_interval_mins != 0 {
            self.refresh_interval_mins = other.refresh_interval_mins;
        }
        if !other.upstream.is_empty() {
            self.upstream = other.upstream;
        }
        if !other.default.is_empty() {
            self.default = other.default;
        }
        self.rules.extend(other.rules);
    }

    /// The effective refresh interval.
    pub fn effective_refresh_interval(&self) -> Duration {
        let mins = if self.refresh_interval_mins != 0 {
            self.refresh_interval_mins
        } else {
            DEFAULT_REFRESH_MINS
        };
        Duration::from_secs(u64::from(mins) * 60)
    }

    /// The effective default directive string.
    pub fn effective_default(&self) -> &str {
        if self.default.is_empty() {
            "DIRECT"
        } else {
            &self.default
        }
    }
}
