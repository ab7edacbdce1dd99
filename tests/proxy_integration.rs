//! End-to-end tests driving the proxy over real loopback sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use url::Url;

use pac_proxy::policy::{Directive, DirectResolver, PolicyError, PolicyResolver, RuleSet};
use pac_proxy::proxy::{ProxyConfig, ProxyServer, DEFAULT_MAX_HEADER_BYTES};

/// Resolver returning a fixed answer and counting lookups.
struct CountingResolver {
    answer: Vec<Directive>,
    calls: AtomicUsize,
}

impl CountingResolver {
    fn new(answer: Vec<Directive>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }
}

impl PolicyResolver for CountingResolver {
    fn find_proxy(&self, _url: &Url) -> Result<Vec<Directive>, PolicyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

struct FailingResolver;

impl PolicyResolver for FailingResolver {
    fn find_proxy(&self, _url: &Url) -> Result<Vec<Directive>, PolicyError> {
        Err(PolicyError::InvalidRules("deliberate".to_string()))
    }
}

/// Start a proxy on an ephemeral port. The returned sender keeps the
/// server accepting; dropping it shuts the server down.
async fn start_proxy(resolver: Arc<dyn PolicyResolver>) -> (u16, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let server = ProxyServer::bind(
        ProxyConfig {
            port: 0,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            resolver,
        },
        rx,
    )
    .await
    .expect("bind proxy");
    let port = server.local_addr().expect("local addr").port();
    tokio::spawn(server.run());
    (port, tx)
}

/// Accept one connection, capture what arrives, send a canned response.
async fn one_shot_server(response: &'static [u8]) -> (u16, tokio::task::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind origin");
    let port = listener.local_addr().expect("local addr").port();
    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.expect("read");
            received.extend_from_slice(&buf[..n]);
            // One request head is enough for these tests
            if n == 0 || received.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        stream.write_all(response).await.expect("write response");
        stream.shutdown().await.ok();
        received
    });
    (port, handle)
}

async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.expect("read to end");
    out
}

#[tokio::test]
async fn direct_request_is_rewritten_to_origin_form() {
    let (origin_port, origin) = one_shot_server(b"HTTP/1.1 204 No Content\r\n\r\n").await;
    let (proxy_port, _shutdown) = start_proxy(Arc::new(DirectResolver)).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port))
        .await
        .expect("connect proxy");
    let request = format!(
        "GET http://127.0.0.1:{origin_port}/hello?q=1 HTTP/1.1\r\nHost: 127.0.0.1:{origin_port}\r\nUser-Agent: t\r\n\r\n"
    );
    client.write_all(request.as_bytes()).await.expect("send");

    let response = read_to_end(&mut client).await;
    assert!(response.starts_with(b"HTTP/1.1 204"));

    let seen = origin.await.expect("origin task");
    let expected = format!(
        "GET /hello?q=1 HTTP/1.1\r\nHost: 127.0.0.1:{origin_port}\r\nUser-Agent: t\r\n\r\n"
    );
    assert_eq!(seen, expected.into_bytes());
}

#[tokio::test]
async fn upstream_directive_forwards_request_verbatim() {
    let (upstream_port, upstream) = one_shot_server(b"HTTP/1.1 200 OK\r\n\r\n").await;
    let resolver = CountingResolver::new(vec![Directive::Proxy {
        host: "127.0.0.1".to_string(),
        port: upstream_port,
    }]);
    let (proxy_port, _shutdown) = start_proxy(resolver.clone()).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port))
        .await
        .expect("connect proxy");
    let request = b"GET http://example.com/path HTTP/1.1\r\nHost: example.com\r\n\r\n";
    client.write_all(request).await.expect("send");

    let response = read_to_end(&mut client).await;
    assert!(response.starts_with(b"HTTP/1.1 200"));

    // The upstream proxy must see the absolute-form request untouched
    let seen = upstream.await.expect("upstream task");
    assert_eq!(seen, request.to_vec());
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_tunnel_greets_then_relays() {
    let (origin_port, origin) = one_shot_server(b"pong").await;
    let (proxy_port, _shutdown) = start_proxy(Arc::new(DirectResolver)).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port))
        .await
        .expect("connect proxy");
    let request = format!("CONNECT 127.0.0.1:{origin_port} HTTP/1.1\r\n\r\n");
    client.write_all(request.as_bytes()).await.expect("send");

    // The greeting arrives alone, before any relayed byte
    let mut greeting = [0u8; 19];
    client.read_exact(&mut greeting).await.expect("greeting");
    assert_eq!(&greeting, b"HTTP/1.0 200 OK\r\n\r\n");

    client.write_all(b"ping\r\n\r\n").await.expect("send ping");
    let relayed = read_to_end(&mut client).await;
    assert_eq!(relayed, b"pong");

    // The CONNECT head itself never reaches the origin
    let seen = origin.await.expect("origin task");
    assert_eq!(seen, b"ping\r\n\r\n".to_vec());
}

#[tokio::test]
async fn looping_request_closes_without_consulting_policy() {
    let resolver = CountingResolver::new(vec![Directive::Direct]);
    let (proxy_port, _shutdown) = start_proxy(resolver.clone()).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port))
        .await
        .expect("connect proxy");
    let request = format!("GET http://127.0.0.1:{proxy_port}/ HTTP/1.1\r\n\r\n");
    client.write_all(request.as_bytes()).await.expect("send");

    let response = read_to_end(&mut client).await;
    assert!(response.is_empty());
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_header_closes_the_connection() {
    let (proxy_port, _shutdown) = start_proxy(Arc::new(DirectResolver)).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port))
        .await
        .expect("connect proxy");
    let mut request = b"GET http://example.com/ HTTP/1.1\r\n".to_vec();
    request.extend_from_slice(b"X-Fill: ");
    request.extend(std::iter::repeat(b'a').take(DEFAULT_MAX_HEADER_BYTES));
    // Never terminated; the proxy must give up at the bound. The close may
    // race the tail of the write, so write and read errors both count as
    // the connection being torn down.
    let _ = client.write_all(&request).await;

    let mut response = Vec::new();
    let _ = client.read_to_end(&mut response).await;
    assert!(response.is_empty());
}

#[tokio::test]
async fn resolver_failure_falls_back_to_direct() {
    let (origin_port, origin) = one_shot_server(b"HTTP/1.1 200 OK\r\n\r\n").await;
    let (proxy_port, _shutdown) = start_proxy(Arc::new(FailingResolver)).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port))
        .await
        .expect("connect proxy");
    let request =
        format!("GET http://127.0.0.1:{origin_port}/ok HTTP/1.1\r\nHost: 127.0.0.1:{origin_port}\r\n\r\n");
    client.write_all(request.as_bytes()).await.expect("send");

    let response = read_to_end(&mut client).await;
    assert!(response.starts_with(b"HTTP/1.1 200"));

    let seen = origin.await.expect("origin task");
    assert!(seen.starts_with(b"GET /ok HTTP/1.1\r\n"));
}

#[tokio::test]
async fn connect_failure_closes_with_no_response() {
    let (proxy_port, _shutdown) = start_proxy(Arc::new(DirectResolver)).await;

    // Reserve a port, then close it so the connect is refused
    let unused = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let dead_port = unused.local_addr().expect("local addr").port();
    drop(unused);

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port))
        .await
        .expect("connect proxy");
    let request = format!("CONNECT 127.0.0.1:{dead_port} HTTP/1.1\r\n\r\n");
    client.write_all(request.as_bytes()).await.expect("send");

    // No greeting, no error body: the connection just closes
    let response = read_to_end(&mut client).await;
    assert!(response.is_empty());
}

#[tokio::test]
async fn rule_set_routes_by_host_pattern() {
    let (upstream_port, upstream) = one_shot_server(b"HTTP/1.1 200 OK\r\n\r\n").await;
    let rules = RuleSet::new(
        &[pac_proxy::policy::RuleEntry {
            pattern: "internal.corp".to_string(),
            directives: format!("PROXY 127.0.0.1:{upstream_port}"),
        }],
        "DIRECT",
    )
    .expect("rules");
    let (proxy_port, _shutdown) = start_proxy(Arc::new(rules)).await;

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port))
        .await
        .expect("connect proxy");
    let request = b"GET http://internal.corp/app HTTP/1.1\r\nHost: internal.corp\r\n\r\n";
    client.write_all(request).await.expect("send");

    let response = read_to_end(&mut client).await;
    assert!(response.starts_with(b"HTTP/1.1 200"));

    let seen = upstream.await.expect("upstream task");
    assert_eq!(seen, request.to_vec());
}
