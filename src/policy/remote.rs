//! Remote rules file: download, disk cache, and out-of-band refresh.
//!
//! The rules document lives at a URL supplied by the operator. It is
//! downloaded once at startup (or reused from the on-disk cache when the
//! cached copy is fresh), cached under `$XDG_CACHE_HOME/pac-proxy/`, and
//! refreshed from a background task on a fixed interval.
//!
//! Sessions never wait on a refresh: the current [`RuleSet`] is published
//! through an atomic snapshot swap, so a concurrent lookup observes either
//! the old or the new rule set, never a partially-written one. A failed
//! fetch keeps the previous snapshot and is only logged.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use super::directive::Directive;
use super::error::PolicyError;
use super::resolver::PolicyResolver;
use super::rules::RuleSet;

/// Default refresh interval for the remote rules file.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Cache directory name under the user cache root.
const CACHE_DIR_NAME: &str = "pac-proxy";

/// A policy resolver backed by a periodically refreshed remote rules file.
pub struct RemoteRules {
    url: Url,
    cache_path: PathBuf,
    refresh_interval: Duration,
    current: ArcSwap<RuleSet>,
    client: reqwest::Client,
}

impl RemoteRules {
    /// Create a resolver for the given rules URL.
    ///
    /// No I/O happens here; call [`RemoteRules::initialize`] to load the
    /// first snapshot and [`RemoteRules::spawn_refresh`] to keep it fresh.
    pub fn new(url: Url, cache_path: PathBuf, refresh_interval: Duration) -> Self {
        Self {
            url,
            cache_path,
            refresh_interval,
            current: ArcSwap::from_pointee(RuleSet::direct()),
            client: reqwest::Client::new(),
        }
    }

    /// Compute the default on-disk cache path for a rules URL.
    ///
    /// Honors `XDG_CACHE_HOME`, falling back to the platform cache dir.
    /// The filename embeds a hash of the URL so distinct rules files do not
    /// collide.
    pub fn default_cache_path(url: &Url) -> PathBuf {
        let root = std::env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(dirs::cache_dir)
            .unwrap_or_else(|| PathBuf::from(".cache"));
        let mut hasher = DefaultHasher::new();
        url.as_str().hash(&mut hasher);
        root.join(CACHE_DIR_NAME)
            .join(format!("{:016x}.toml", hasher.finish()))
    }

    /// Load the initial snapshot.
    ///
    /// Reuses the cached copy when it is fresher than the refresh interval;
    /// otherwise fetches. When the fetch fails, a stale cached copy is
    /// still used. When neither is available the resolver starts empty
    /// (answering `DIRECT`) and the next refresh retries — a policy
    /// failure must never take the proxy down.
    pub async fn initialize(&self) {
        if self.cache_is_fresh() {
            match self.load_cached() {
                Ok(()) => {
                    debug!("Loaded fresh rules cache from {:?}", self.cache_path);
                    return;
                }
                Err(e) => warn!("Ignoring unreadable rules cache: {e}"),
            }
        }
        if let Err(e) = self.refresh().await {
            warn!("Initial rules fetch failed: {e}");
            match self.load_cached() {
                Ok(()) => info!("Using stale rules cache from {:?}", self.cache_path),
                Err(_) => warn!("No usable rules; answering DIRECT until a fetch succeeds"),
            }
        }
    }

    /// Fetch the rules document, publish it, and rewrite the disk cache.
    pub async fn refresh(&self) -> Result<(), PolicyError> {
        info!("Updating rules file {}", self.url);
        let text = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| PolicyError::Fetch {
                url: self.url.to_string(),
                message: e.to_string(),
            })?
            .text()
            .await
            .map_err(|e| PolicyError::Fetch {
                url: self.url.to_string(),
                message: e.to_string(),
            })?;
        self.publish(&text)?;
        self.write_cache(&text)?;
        Ok(())
    }

    /// Spawn the out-of-band refresh task.
    ///
    /// Ticks at the refresh interval and exits on the shutdown signal. A
    /// failed refresh keeps the previous snapshot.
    pub fn spawn_refresh(
        self: Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.refresh_interval);
            // The first tick fires immediately; initialize() already did that work
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.refresh().await {
                            warn!("Rules refresh failed, keeping previous snapshot: {e}");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Parse a rules document and publish it as the current snapshot.
    fn publish(&self, text: &str) -> Result<(), PolicyError> {
        let rules = RuleSet::from_toml(text)?;
        debug!("Publishing rules snapshot with {} rules", rules.len());
        self.current.store(Arc::new(rules));
        Ok(())
    }

    /// Load and publish the cached document, regardless of freshness.
    fn load_cached(&self) -> Result<(), PolicyError> {
        let text = fs::read_to_string(&self.cache_path).map_err(|e| PolicyError::Cache {
            path: self.cache_path.clone(),
            source: e,
        })?;
        self.publish(&text)
    }

    /// Whether the cached copy is newer than the refresh interval.
    fn cache_is_fresh(&self) -> bool {
        file_age(&self.cache_path)
            .map(|age| age < self.refresh_interval)
            .unwrap_or(false)
    }

    fn write_cache(&self, text: &str) -> Result<(), PolicyError> {
        let to_cache_err = |e: std::io::Error| PolicyError::Cache {
            path: self.cache_path.clone(),
            source: e,
        };
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).map_err(to_cache_err)?;
        }
        fs::write(&self.cache_path, text).map_err(to_cache_err)
    }

    /// Number of rules in the current snapshot.
    pub fn rule_count(&self) -> usize {
        self.current.load().len()
    }
}

impl PolicyResolver for RemoteRules {
    fn find_proxy(&self, url: &Url) -> Result<Vec<Directive>, PolicyError> {
        self.current.load().find_proxy(url)
    }
}

fn file_age(path: &Path) -> Option<Duration> {
    let mtime = fs::metadata(path).ok()?.modified().ok()?;
    // A cache file with a future mtime counts as stale
    SystemTime::now().duration_since(mtime).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const DOC: &str = r#"
default = "DIRECT"

[[rules]]
pattern = "*.corp"
directives = "PROXY proxy.corp:8080"
"#;

    fn remote(cache_path: PathBuf) -> RemoteRules {
        RemoteRules::new(
            Url::parse("http://rules.example/rules.toml").unwrap(),
            cache_path,
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_starts_direct_until_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let rr = remote(dir.path().join("rules.toml"));
        let url = Url::parse("http://git.corp/").unwrap();
        assert_eq!(rr.find_proxy(&url).unwrap(), vec![Directive::Direct]);
    }

    #[test]
    fn test_publish_swaps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let rr = remote(dir.path().join("rules.toml"));
        rr.publish(DOC).unwrap();
        assert_eq!(rr.rule_count(), 1);

        let url = Url::parse("http://git.corp/").unwrap();
        assert_eq!(
            rr.find_proxy(&url).unwrap(),
            vec![Directive::Proxy {
                host: "proxy.corp".to_string(),
                port: 8080
            }]
        );
    }

    #[test]
    fn test_bad_document_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let rr = remote(dir.path().join("rules.toml"));
        rr.publish(DOC).unwrap();
        assert!(rr.publish("not [ valid").is_err());
        assert_eq!(rr.rule_count(), 1);
    }

    #[tokio::test]
    async fn test_initialize_from_fresh_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("rules.toml");
        fs::write(&cache, DOC).unwrap();

        let rr = remote(cache);
        rr.initialize().await;
        assert_eq!(rr.rule_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_fetches_and_caches() {
        // Serve one canned HTTP response on a loopback listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let body = DOC;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("rules.toml");
        let rr = RemoteRules::new(
            Url::parse(&format!("http://{addr}/rules.toml")).unwrap(),
            cache.clone(),
            Duration::from_secs(3600),
        );
        rr.refresh().await.unwrap();
        server.await.unwrap();

        assert_eq!(rr.rule_count(), 1);
        assert_eq!(fs::read_to_string(&cache).unwrap(), DOC);
    }

    #[tokio::test]
    async fn test_initialize_survives_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Unroutable URL, no cache: the resolver degrades to DIRECT
        let rr = RemoteRules::new(
            Url::parse("http://127.0.0.1:1/rules.toml").unwrap(),
            dir.path().join("rules.toml"),
            Duration::from_secs(3600),
        );
        rr.initialize().await;
        let url = Url::parse("http://git.corp/").unwrap();
        assert_eq!(rr.find_proxy(&url).unwrap(), vec![Directive::Direct]);
    }

    #[test]
    fn test_default_cache_path_distinct_per_url() {
        let a = RemoteRules::default_cache_path(&Url::parse("http://a.example/r.toml").unwrap());
        let b = RemoteRules::default_cache_path(&Url::parse("http://b.example/r.toml").unwrap());
        assert_ne!(a, b);
        assert!(a.to_string_lossy().contains(CACHE_DIR_NAME));
    }
}
