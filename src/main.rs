//! pac-proxy: policy-directed local HTTP(S) forwarding proxy.
//!
//! This is the main entry point for the pac-proxy binary. It handles CLI
//! argument parsing, configuration loading, policy resolver construction,
//! and runs the accept loop until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pac_proxy::{
    cli::Cli,
    config::{Config, ConfigLoader},
    policy::{DirectResolver, PolicyResolver, RemoteRules, RuleSet},
    proxy::{ProxyConfig, ProxyServer},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    debug!("Parsed CLI arguments: {:?}", cli);

    let config = ConfigLoader::new()
        .load(&cli)
        .context("Failed to load configuration")?;
    debug!("Loaded configuration: {:?}", config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let resolver = build_resolver(&config, shutdown_rx.clone())
        .await
        .context("Failed to build policy resolver")?;

    let server = ProxyServer::bind(
        ProxyConfig {
            port: config.server.effective_port(),
            max_header_bytes: config.server.effective_max_header_bytes(),
            resolver,
        },
        shutdown_rx,
    )
    .await
    .context("Failed to bind proxy listener")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    server.run().await.context("Proxy server failed")?;
    Ok(())
}

/// Construct the policy resolver from configuration.
///
/// Precedence: a rules URL wins over a fixed upstream, which wins over
/// inline rules; with none of those, everything goes direct.
async fn build_resolver(
    config: &Config,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<Arc<dyn PolicyResolver>> {
    if !config.policy.rules_url.is_empty() {
        let url = Url::parse(&config.policy.rules_url).with_context(|| {
            format!("Invalid rules URL '{}'", config.policy.rules_url)
        })?;
        let cache_path = RemoteRules::default_cache_path(&url);
        let remote = Arc::new(RemoteRules::new(
            url,
            cache_path,
            config.policy.effective_refresh_interval(),
        ));
        remote.initialize().await;
        info!("Routing from remote rules ({} rules)", remote.rule_count());
        Arc::clone(&remote).spawn_refresh(shutdown_rx);
        return Ok(remote);
    }

    if !config.policy.upstream.is_empty() {
        let (host, port) = Cli::parse_upstream(&config.policy.upstream)
            .with_context(|| format!("Invalid upstream '{}'", config.policy.upstream))?;
        info!("Routing everything through {host}:{port}");
        return Ok(Arc::new(RuleSet::fixed_upstream(&host, port)));
    }

    if !config.policy.rules.is_empty() {
        let rules = RuleSet::new(&config.policy.rules, config.policy.effective_default())
            .context("Invalid inline rules in configuration")?;
        info!("Routing from {} inline rules", rules.len());
        return Ok(Arc::new(rules));
    }

    warn!("No policy configured, sending everything direct");
    Ok(Arc::new(DirectResolver))
}

/// Initialize the tracing subscriber.
///
/// # Verbosity Levels
/// - 0 (default): Only warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
