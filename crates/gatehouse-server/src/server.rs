//! HTTP/1.1 server.
//!
//! The server accepts TCP connections until shutdown is signalled and serves
//! each one on its own task with hyper's `http1` connection builder. Each
//! request body is read within the read timeout and the size cap, dispatched
//! through the [`App`] within the write timeout, and given a cancellation
//! token that fires when hyper drops the request (the client went away) or
//! when the shutdown drain deadline passes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatehouse_middleware::stages::MemoryTokenStore;
//! use gatehouse_server::{App, Server, ServerConfig};
//!
//! # async fn run() -> Result<(), gatehouse_server::ServerError> {
//! let app = App::with_default_stack(Arc::new(MemoryTokenStore::new()));
//! let server = Server::builder()
//!     .config(ServerConfig::builder().http_addr("127.0.0.1:8000").build())
//!     .app(app)
//!     .build();
//!
//! server.run().await
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use gatehouse_core::{RequestContext, RequestId};
use gatehouse_middleware::types::{REQUEST_ID_HEADER, TRACE_ID_HEADER};
use gatehouse_telemetry::InFlightGuard;
use http::header::{self, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::app::{App, HttpResponse};
use crate::config::ServerConfig;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The configured address.
        addr: String,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Listener I/O failed.
    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    app: App,
}

impl Server {
    /// Creates a server.
    #[must_use]
    pub const fn new(config: ServerConfig, app: App) -> Self {
        Self { config, app }
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the router.
    #[must_use]
    pub const fn app(&self) -> &App {
        &self.app
    }

    /// Runs until SIGINT or SIGTERM, then drains.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    ///
    /// A bind failure triggers `shutdown` so sibling tasks stop too.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.http_addr().to_string();
        let listener = match TcpListener::bind(addr.as_str()).await {
            Ok(listener) => listener,
            Err(source) => {
                tracing::error!(addr = %addr, err = %source, "listen failed");
                shutdown.trigger();
                return Err(ServerError::Bind { addr, source });
            }
        };
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "server listening");

        let shared = Arc::new(Shared {
            app: self.app,
            config: self.config,
            abort: CancellationToken::new(),
        });
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let shared = Arc::clone(&shared);
                        let shutdown = shutdown.clone();
                        let token = tracker.acquire();
                        tokio::spawn(async move {
                            serve_connection(shared, stream, remote_addr, shutdown).await;
                            drop(token);
                        });
                    }
                    Err(err) => {
                        tracing::error!(err = %err, "accept failed");
                    }
                }
            }
        }
        drop(listener);

        let shutdown_timeout = shared.config.shutdown_timeout();
        tracing::info!(
            connections = tracker.active_connections(),
            timeout_ms = u64::try_from(shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
            "draining connections"
        );

        tokio::select! {
            () = tracker.wait_for_drain() => {
                tracing::info!("all connections closed");
            }
            () = tokio::time::sleep(shutdown_timeout) => {
                tracing::warn!(
                    connections = tracker.active_connections(),
                    "shutdown timeout reached, cancelling in-flight requests"
                );
                shared.abort.cancel();
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

/// Builder for [`Server`].
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: Option<ServerConfig>,
    app: Option<App>,
}

impl ServerBuilder {
    /// Sets the listener configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the router.
    #[must_use]
    pub fn app(mut self, app: App) -> Self {
        self.app = Some(app);
        self
    }

    /// Builds the server. Missing parts fall back to the defaults and an
    /// empty router with no interceptors.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            config: self.config.unwrap_or_default(),
            app: self.app.unwrap_or_else(|| App::new(Vec::new())),
        }
    }
}

/// State shared by every connection task.
struct Shared {
    app: App,
    config: ServerConfig,
    /// Parent of every request token. Cancelled when the drain deadline passes.
    abort: CancellationToken,
}

async fn serve_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    shutdown: ShutdownSignal,
) {
    let activity = Arc::new(Activity::new());

    let service = {
        let shared = Arc::clone(&shared);
        let activity = Arc::clone(&activity);
        service_fn(move |request: Request<Incoming>| {
            let shared = Arc::clone(&shared);
            let busy = activity.begin();
            async move {
                let response = shared.handle_request(request, remote_addr).await;
                drop(busy);
                Ok::<_, Infallible>(response)
            }
        })
    };

    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(shared.config.read_timeout())
        .keep_alive(true)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(err) = result {
                tracing::debug!(remote_addr = %remote_addr, err = %err, "connection error");
            }
            return;
        }
        () = shutdown.recv() => {
            tracing::debug!(remote_addr = %remote_addr, "closing connection for shutdown");
        }
        () = activity.idle(shared.config.idle_timeout()) => {
            tracing::debug!(remote_addr = %remote_addr, "closing idle connection");
        }
    }

    connection.as_mut().graceful_shutdown();
    if let Err(err) = connection.as_mut().await {
        tracing::debug!(remote_addr = %remote_addr, err = %err, "connection error during close");
    }
}

impl Shared {
    async fn handle_request(&self, request: Request<Incoming>, remote_addr: SocketAddr) -> HttpResponse {
        let _in_flight = InFlightGuard::new();

        // Hyper drops this future when the client disconnects.
        let token = self.abort.child_token();
        let _cancel_on_drop = token.clone().drop_guard();

        let request_id = request
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<RequestId>().ok())
            .unwrap_or_default();

        let mut ctx = RequestContext::with_cancellation(request_id, token).with_remote_addr(remote_addr);
        if let Some(trace_id) = request
            .headers()
            .get(&TRACE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            ctx = ctx.with_trace_id(trace_id);
        }

        let origin = request.headers().get(header::ORIGIN).cloned();
        let (parts, body) = request.into_parts();
        let limited = Limited::new(body, self.config.max_body_bytes());
        let body = match tokio::time::timeout(self.config.read_timeout(), limited.collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(err)) if err.downcast_ref::<LengthLimitError>().is_some() => {
                tracing::debug!(
                    request_id = %request_id,
                    limit = self.config.max_body_bytes(),
                    "request body too large"
                );
                return bare_response(&self.app, StatusCode::PAYLOAD_TOO_LARGE, request_id, origin.as_ref());
            }
            Ok(Err(err)) => {
                tracing::debug!(request_id = %request_id, err = %err, "failed to read request body");
                return bare_response(&self.app, StatusCode::BAD_REQUEST, request_id, origin.as_ref());
            }
            Err(_) => {
                tracing::debug!(request_id = %request_id, "request body read timed out");
                return bare_response(&self.app, StatusCode::REQUEST_TIMEOUT, request_id, origin.as_ref());
            }
        };
        let request = Request::from_parts(parts, body);

        let write_timeout = self.config.write_timeout();
        let dispatch = self.app.dispatch(ctx.with_timeout(write_timeout), request);
        let mut response = match tokio::time::timeout(write_timeout, dispatch).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    request_id = %request_id,
                    timeout_ms = u64::try_from(write_timeout.as_millis()).unwrap_or(u64::MAX),
                    "request timed out"
                );
                bare_response(&self.app, StatusCode::SERVICE_UNAVAILABLE, request_id, origin.as_ref())
            }
        };

        set_request_id(&mut response, request_id);
        response
    }
}

/// An empty response produced outside the chain. It still carries the
/// app's edge headers so browsers can read the status cross-origin.
fn bare_response(
    app: &App,
    status: StatusCode,
    request_id: RequestId,
    origin: Option<&HeaderValue>,
) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    app.apply_edge_headers(response.headers_mut(), origin);
    set_request_id(&mut response, request_id);
    response
}

fn set_request_id(response: &mut HttpResponse, request_id: RequestId) {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

/// Tracks whether a connection is serving a request and when it last did.
#[derive(Debug)]
struct Activity {
    in_flight: AtomicUsize,
    last_seen: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        *self.last_seen.lock() = Instant::now();
        Busy {
            activity: Arc::clone(self),
        }
    }

    /// Completes once no request has been in flight for `timeout`.
    async fn idle(&self, timeout: Duration) {
        loop {
            let now = Instant::now();
            let deadline = *self.last_seen.lock() + timeout;
            let busy = self.in_flight.load(Ordering::SeqCst) > 0;

            if !busy && deadline <= now {
                return;
            }
            let wake = if busy || deadline <= now { now + timeout } else { deadline };
            tokio::time::sleep_until(wake).await;
        }
    }
}

struct Busy {
    activity: Arc<Activity>,
}

impl Drop for Busy {
    fn drop(&mut self) {
        *self.activity.last_seen.lock() = Instant::now();
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
