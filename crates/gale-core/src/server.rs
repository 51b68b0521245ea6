//! Native HTTP server
//!
//! hyper HTTP/1.1 on a multi-threaded tokio runtime:
//! - SO_REUSEADDR / SO_REUSEPORT listener
//! - TCP_NODELAY for low latency
//! - One task per connection
//! - Graceful shutdown with connection draining

use crate::{App, Error, Method, Request, Response, Result, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use socket2::{Domain, Protocol, Socket, Type};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub hostname: String,
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8054,
            hostname: "0.0.0.0".to_string(),
            workers: num_cpus::get(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Socket address to bind
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.hostname, self.port)
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid address {}:{}: {}", self.hostname, self.port, e)))
    }
}

/// Create a TCP socket with optimizations
pub fn create_optimized_socket(addr: &SocketAddr) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // SO_REUSEPORT - enable kernel load balancing across threads
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    // TCP_NODELAY - disable Nagle's algorithm for lower latency
    socket.set_nodelay(true)?;

    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(1024)?;

    Ok(socket)
}

/// Convert a hyper request, collecting its body
pub async fn from_hyper_request(req: hyper::Request<Incoming>) -> Result<Request> {
    let (parts, body) = req.into_parts();

    let method = Method::from_str(parts.method.as_str())?;
    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let mut request = Request::new(method, url);
    for (name, value) in &parts.headers {
        if let Ok(v) = value.to_str() {
            request.headers.push((name.to_string(), v.to_string()));
        }
    }

    request.body = body
        .collect()
        .await
        .map_err(|e| Error::Hyper(e.to_string()))?
        .to_bytes();

    Ok(request)
}

/// Convert our Response to a hyper Response
pub fn to_hyper_response(res: Response) -> Result<hyper::Response<Full<Bytes>>> {
    let (status, headers, body) = res.into_parts();
    let mut builder = hyper::Response::builder().status(status.as_u16());

    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    builder
        .body(Full::new(body))
        .map_err(|e| Error::Hyper(e.to_string()))
}

fn plain_response(status: StatusCode, body: &'static str) -> hyper::Response<Full<Bytes>> {
    let mut res = hyper::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *res.status_mut() = http::StatusCode::from_u16(status.as_u16())
        .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
    res
}

async fn handle_request(
    app: Arc<App>,
    req: hyper::Request<Incoming>,
) -> std::result::Result<hyper::Response<Full<Bytes>>, Infallible> {
    let request = match from_hyper_request(req).await {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read request");
            return Ok(plain_response(StatusCode::BAD_REQUEST, "Bad Request"));
        }
    };

    let response = app.dispatch(request).await;
    match to_hyper_response(response) {
        Ok(res) => Ok(res),
        Err(e) => {
            tracing::error!(error = %e, "Invalid response");
            Ok(plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"))
        }
    }
}

/// Tracks active connections for graceful shutdown
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    active: AtomicU64,
    shutting_down: AtomicBool,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Current active connection count
    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop accepting new connections
    pub fn start_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait until no connection is active; `false` on timeout
    pub async fn drain(&self, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while self.count() > 0 {
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

/// HTTP server driving an [`App`]
pub struct Server {
    app: Arc<App>,
    config: ServerConfig,
    tracker: Arc<ConnectionTracker>,
}

impl Server {
    pub fn new(app: Arc<App>, config: ServerConfig) -> Self {
        Self {
            app,
            config,
            tracker: Arc::new(ConnectionTracker::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    /// Serve until the process is stopped
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes
    ///
    /// New connections are refused once shutdown starts; connections in
    /// flight keep running on their own tasks.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper_util::rt::TokioIo;

        let addr = self.config.addr()?;
        let socket = create_optimized_socket(&addr)?;
        let listener = tokio::net::TcpListener::from_std(socket.into())?;
        tracing::info!(%addr, "Listening");

        tokio::pin!(shutdown);

        loop {
            let stream = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        tracing::debug!(error = %e, "Accept failed");
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    self.tracker.start_shutdown();
                    tracing::info!(active = self.tracker.count(), "Shutting down");
                    return Ok(());
                }
            };

            if self.tracker.is_shutting_down() {
                drop(stream);
                continue;
            }

            let app = self.app.clone();
            let tracker = self.tracker.clone();
            tracker.increment();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| handle_request(app.clone(), req));

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    // Only log if not a normal connection close
                    if !e.is_incomplete_message() {
                        tracing::debug!(error = %e, "Connection error");
                    }
                }

                tracker.decrement();
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8054);
        assert_eq!(config.addr().unwrap().port(), 8054);
        assert!(config.workers >= 1);
    }

    #[test]
    fn test_bad_address() {
        let config = ServerConfig::new().hostname("not an address");
        assert!(config.addr().is_err());
    }

    #[test]
    fn test_to_hyper_response() {
        let mut res = Response::new();
        res.set_status(StatusCode::NOT_FOUND);
        res.set_header("X-Test", "1");
        res.end_with("missing");

        let hyper_res = to_hyper_response(res).unwrap();
        assert_eq!(hyper_res.status(), 404);
        assert_eq!(hyper_res.headers()["x-test"], "1");
        assert_eq!(hyper_res.headers()["content-type"], "text/html; charset=utf-8");
    }

    #[tokio::test]
    async fn test_tracker_drain() {
        let tracker = ConnectionTracker::new();
        assert!(tracker.drain(Duration::from_millis(10)).await);

        tracker.increment();
        assert!(!tracker.drain(Duration::from_millis(30)).await);
        tracker.decrement();
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let app = Arc::new(App::new(crate::Settings::default()));
        app.get("/ping", |ex| async move {
            ex.response().send_text("pong");
            Ok(())
        });

        let server = Server::new(app, ServerConfig::new().hostname("127.0.0.1").port(0));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();

        let result = server
            .run_until(async move {
                let _ = rx.await;
            })
            .await;
        assert!(result.is_ok());
        assert!(server.tracker().is_shutting_down());
    }
}
