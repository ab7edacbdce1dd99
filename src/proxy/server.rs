//! Loopback listener and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::policy::PolicyResolver;

use super::error::ProxyError;
use super::framer::DEFAULT_MAX_HEADER_BYTES;
use super::session::ProxySession;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5043;

/// Runtime parameters for the proxy server.
pub struct ProxyConfig {
    /// Loopback port to listen on.
    pub port: u16,
    /// Upper bound on a request head, in bytes.
    pub max_header_bytes: usize,
    /// Routing policy shared by all sessions.
    pub resolver: Arc<dyn PolicyResolver>,
}

impl ProxyConfig {
    /// Config with the default port and header bound.
    pub fn new(resolver: Arc<dyn PolicyResolver>) -> Self {
        Self {
            port: DEFAULT_PORT,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            resolver,
        }
    }
}

/// The listening proxy. Accepts loopback connections and spawns a
/// [`ProxySession`] per client.
pub struct ProxyServer {
    listener: TcpListener,
    config: ProxyConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl ProxyServer {
    /// Bind the loopback listener.
    ///
    /// A bind failure (typically the port already being held) is fatal:
    /// there is no fallback port.
    pub async fn bind(
        config: ProxyConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, ProxyError> {
        let addr = format!("127.0.0.1:{}", config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })?;
        Ok(Self {
            listener,
            config,
            shutdown_rx,
        })
    }

    /// The bound address. Useful when the port was 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown is signalled.
    ///
    /// Session errors never stop the loop: a failed session closes its own
    /// connection and is logged here.
    pub async fn run(mut self) -> Result<(), ProxyError> {
        let listen_port = self.local_addr()?.port();
        info!("Listening on 127.0.0.1:{listen_port}");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("Accept failed: {e}");
                            continue;
                        }
                    };
                    debug!("Accepted connection from {peer}");
                    let session = ProxySession::new(
                        stream,
                        listen_port,
                        Arc::clone(&self.config.resolver),
                        self.config.max_header_bytes,
                    );
                    tokio::spawn(async move {
                        if let Err(e) = session.run().await {
                            if e.is_benign_disconnect() {
                                debug!("Session from {peer} ended: {e}");
                            } else {
                                warn!("Session from {peer} failed: {e}");
                            }
                        }
                    });
                }
                changed = self.shutdown_rx.changed() => {
                    // A dropped sender counts as shutdown
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signalled, no longer accepting");
                        return Ok(());
                    }
                }
            }
        }
    }
}
