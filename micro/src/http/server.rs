//! HTTP/1.1 server: acceptor plus per-connection sessions.
//!
//! The server owns one listener and runs entirely on the event loop it was
//! given: the accept loop and every session it spawns are tasks on that
//! loop, so per-connection work is serialized by construction. A session
//! cycles read → handle → write and either reads the next request on
//! keep-alive or closes.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::http::codec::{self, ParseError};
use crate::http::router::Router;
use crate::http::types::{Response, Version};
use crate::metrics::{self, MetricLabels};
use crate::runtime::{IoLoop, Server};
use crate::trace::TraceContext;

/// Latency bucket upper bounds (milliseconds) for the request histogram.
const REQUEST_MS_BUCKETS: [f64; 9] = [0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0];

/// Where to listen, as `host:port` with an IP literal host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    pub host: String,
    pub port: u16,
}

impl FromStr for ListenAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let colon = s
            .rfind(':')
            .ok_or_else(|| "expected host:port".to_string())?;
        let host = &s[..colon];
        let port_s = &s[colon + 1..];
        if host.is_empty() || port_s.is_empty() {
            return Err("expected host:port".to_string());
        }
        let port: u16 = port_s.parse().map_err(|_| format!("invalid port: {port_s}"))?;
        if port == 0 {
            return Err("invalid port: 0".to_string());
        }
        Ok(ListenAddress {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An HTTP server bound to one event loop.
pub struct HttpServer {
    handle: Handle,
    addr: ListenAddress,
    router: Arc<Router>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl HttpServer {
    pub fn new(io_loop: &IoLoop, addr: ListenAddress, router: Router) -> Arc<Self> {
        Arc::new(Self {
            handle: io_loop.handle(),
            addr,
            router: Arc::new(router),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        })
    }
}

impl Server for HttpServer {
    /// Bind, listen and start accepting. Idempotent; bind or listen failures
    /// are logged and leave the server non-running.
    fn start(&self) {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let ip: IpAddr = match self.addr.host.parse() {
            Ok(ip) => ip,
            Err(e) => {
                tracing::error!("invalid listen address {}: {e}", self.addr.host);
                self.running.store(false, Ordering::Release);
                return;
            }
        };
        let sock_addr = SocketAddr::new(ip, self.addr.port);

        // Socket setup needs the loop's reactor context.
        let _guard = self.handle.enter();

        let socket = match if sock_addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        } {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("socket open failed: {e}");
                self.running.store(false, Ordering::Release);
                return;
            }
        };

        if let Err(e) = socket.set_reuseaddr(true) {
            tracing::warn!("set_reuseaddr failed: {e}");
        }
        if let Err(e) = socket.bind(sock_addr) {
            tracing::error!("bind {sock_addr} failed: {e}");
            self.running.store(false, Ordering::Release);
            return;
        }
        let listener = match socket.listen(1024) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("listen on {sock_addr} failed: {e}");
                self.running.store(false, Ordering::Release);
                return;
            }
        };

        tracing::info!("HTTP server listening on {}", self.addr);

        self.handle.spawn(accept_loop(
            listener,
            Arc::clone(&self.router),
            Arc::clone(&self.running),
            Arc::clone(&self.shutdown),
        ));
    }

    /// Cancel and close the acceptor. Idempotent. In-flight sessions finish
    /// their current request naturally.
    fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.shutdown.notify_one();
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _peer)) => {
                    tokio::spawn(session(stream, Arc::clone(&router)));
                }
                Err(e) => {
                    if !running.load(Ordering::Acquire) {
                        return;
                    }
                    tracing::warn!("accept failed: {e}");
                }
            }
        }
    }
}

enum ReadOutcome {
    Request(crate::http::types::Request),
    /// Peer closed between requests.
    EndOfStream,
    /// Unusable bytes; a 400 goes out before closing.
    Malformed,
    /// Transport error or truncated request; abort without a response.
    Aborted,
}

async fn read_request(stream: &mut TcpStream, buf: &mut BytesMut) -> ReadOutcome {
    loop {
        match codec::parse_request(buf) {
            Ok((req, consumed)) => {
                let _ = buf.split_to(consumed);
                return ReadOutcome::Request(req);
            }
            Err(ParseError::Incomplete) => match stream.read_buf(buf).await {
                Ok(0) => {
                    if buf.is_empty() {
                        return ReadOutcome::EndOfStream;
                    }
                    return ReadOutcome::Aborted;
                }
                Ok(_) => {}
                Err(_) => return ReadOutcome::Aborted,
            },
            Err(ParseError::Invalid(msg)) => {
                tracing::debug!("malformed request: {msg}");
                return ReadOutcome::Malformed;
            }
        }
    }
}

async fn session(mut stream: TcpStream, router: Arc<Router>) {
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        let mut req = match read_request(&mut stream, &mut buf).await {
            ReadOutcome::Request(req) => req,
            ReadOutcome::EndOfStream => {
                let _ = stream.shutdown().await;
                return;
            }
            ReadOutcome::Malformed => {
                let mut resp = Response::default();
                resp.status = 400;
                resp.set_json("{\"error\":\"bad_request\"}");
                let mut out = BytesMut::new();
                codec::encode_response(
                    Version::Http11,
                    false,
                    &resp,
                    &TraceContext::new_root(),
                    &mut out,
                );
                let _ = stream.write_all(&out).await;
                let _ = stream.shutdown().await;
                return;
            }
            ReadOutcome::Aborted => return,
        };

        let start = Instant::now();

        req.path = codec::extract_path(&req.target).to_string();
        req.query = codec::parse_query(&req.target);
        req.trace = match req.header("traceparent") {
            Some(value) => {
                let parsed = TraceContext::parse_traceparent(value);
                if parsed.is_valid() {
                    parsed
                } else {
                    TraceContext::new_root()
                }
            }
            None => TraceContext::new_root(),
        };

        let mut resp = Response::default();
        router.handle(&req, &mut resp);

        let mut out = BytesMut::with_capacity(256 + resp.body.len());
        codec::encode_response(req.version, req.keep_alive, &resp, &req.trace, &mut out);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let registry = metrics::default_registry();
        registry
            .histogram(
                "http_server_request_ms",
                "HTTP server request latency (ms)",
                REQUEST_MS_BUCKETS.to_vec(),
                MetricLabels::with(&[("path", &req.path)]),
            )
            .observe(elapsed_ms);
        registry
            .counter(
                "http_server_requests_total",
                "HTTP server requests total",
                MetricLabels::with(&[("path", &req.path), ("status", &resp.status.to_string())]),
            )
            .inc(1);

        if stream.write_all(&out).await.is_err() {
            return;
        }

        if !req.keep_alive {
            let _ = stream.shutdown().await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_address_parses_host_port() {
        let addr: ListenAddress = "0.0.0.0:8086".parse().unwrap();
        assert_eq!(addr.host, "0.0.0.0");
        assert_eq!(addr.port, 8086);
        assert_eq!(addr.to_string(), "0.0.0.0:8086");
    }

    #[test]
    fn listen_address_rejects_bad_input() {
        assert!("localhost".parse::<ListenAddress>().is_err());
        assert!(":8080".parse::<ListenAddress>().is_err());
        assert!("127.0.0.1:".parse::<ListenAddress>().is_err());
        assert!("127.0.0.1:0".parse::<ListenAddress>().is_err());
        assert!("127.0.0.1:70000".parse::<ListenAddress>().is_err());
    }
}
