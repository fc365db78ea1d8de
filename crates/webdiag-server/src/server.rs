//! HTTP server lifecycle.
//!
//! [`Server::start`] binds the listen socket and runs the accept loop on a
//! background task, returning a [`RunningServer`] handle. The caller then
//! blocks in [`RunningServer::await_shutdown`] until SIGINT, SIGTERM or its
//! own cancellation signal fires, after which in-flight requests get until
//! the shutdown timeout to finish.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use webdiag_core::RequestIdGenerator;
//! use webdiag_server::{diagnostic_router, Server, ServerConfig, ShutdownSignal};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::builder().http_addr("127.0.0.1:8080").build();
//! let ids = Arc::new(RequestIdGenerator::new()?);
//! let server = Server::new(config, diagnostic_router("Web Diagnostics"), ids);
//!
//! let mut running = server.start().await?;
//! running.await_shutdown(&ShutdownSignal::new()).await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use webdiag_core::RequestIdGenerator;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{error_response, RemoteAddr, Request, Response};
use crate::lifecycle::{ServerState, StateCell};
use crate::middleware::Pipeline;
use crate::router::Router;
use crate::shutdown::{ConnectionTracker, OsSignals, ShutdownSignal};

/// First pause after the accept loop runs out of resources.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);

/// Longest pause between accept retries.
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

type AcceptFuture<'a> =
    Pin<Box<dyn Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send + 'a>>;

/// Source of inbound connections for the accept loop.
trait Acceptor: Send + 'static {
    fn accept(&mut self) -> AcceptFuture<'_>;
}

impl Acceptor for TcpListener {
    fn accept(&mut self) -> AcceptFuture<'_> {
        Box::pin(TcpListener::accept(self))
    }
}

/// A configured server that has not started yet.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Router,
    ids: Arc<RequestIdGenerator>,
    state: Arc<StateCell>,
}

/// State shared by the accept loop and every connection task.
#[derive(Debug)]
struct Shared {
    config: ServerConfig,
    pipeline: Pipeline,
    tracker: ConnectionTracker,
    stop: ShutdownSignal,
}

impl Server {
    /// Creates a server in [`ServerState::Created`].
    #[must_use]
    pub fn new(config: ServerConfig, router: Router, ids: Arc<RequestIdGenerator>) -> Self {
        Self {
            config,
            router,
            ids,
            state: Arc::new(StateCell::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Binds the listen socket and starts accepting connections.
    ///
    /// On success the server is [`ServerState::Serving`].
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyStarted`] if the server left `Created`
    /// - [`ServerError::Bind`] if the address cannot be bound; the server is
    ///   then `Stopped`
    pub async fn start(&self) -> ServerResult<RunningServer> {
        if self.state.get() != ServerState::Created {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = match bind(&self.config).await {
            Ok(listener) => listener,
            Err(source) => {
                self.state.stop();
                return Err(ServerError::Bind {
                    addr: self.config.http_addr().to_string(),
                    source,
                });
            }
        };
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: self.config.http_addr().to_string(),
            source,
        })?;

        self.launch(listener, local_addr)
    }

    fn launch<A: Acceptor>(
        &self,
        acceptor: A,
        local_addr: SocketAddr,
    ) -> ServerResult<RunningServer> {
        if !self.state.transition(ServerState::Created, ServerState::Listening) {
            return Err(ServerError::AlreadyStarted);
        }
        if self.router.is_empty() {
            tracing::warn!("no routes registered, every request gets 404");
        }
        tracing::info!(addr = %local_addr, routes = self.router.len(), "started server");

        let shared = Arc::new(Shared {
            config: self.config.clone(),
            pipeline: Pipeline::new(
                Arc::clone(&self.ids),
                self.router.clone(),
                self.config.request_timeout(),
            ),
            tracker: ConnectionTracker::new(),
            stop: ShutdownSignal::new(),
        });

        let (fatal_tx, fatal_rx) = oneshot::channel();
        let accept_task = tokio::spawn(accept_loop(acceptor, Arc::clone(&shared), fatal_tx));
        self.state
            .transition(ServerState::Listening, ServerState::Serving);

        Ok(RunningServer {
            local_addr,
            state: Arc::clone(&self.state),
            stop: shared.stop.clone(),
            tracker: shared.tracker.clone(),
            shutdown_timeout: self.config.shutdown_timeout(),
            accept_task: Some(accept_task),
            fatal: Some(fatal_rx),
        })
    }
}

/// Handle to a started server.
///
/// Dropping the handle stops the accept loop and closes idle connections
/// without waiting for them.
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    state: Arc<StateCell>,
    stop: ShutdownSignal,
    tracker: ConnectionTracker,
    shutdown_timeout: Duration,
    accept_task: Option<JoinHandle<()>>,
    fatal: Option<oneshot::Receiver<io::Error>>,
}

impl RunningServer {
    /// Returns the bound address, with the real port when port 0 was
    /// requested.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }

    /// Waits for SIGINT, SIGTERM or `cancel`, whichever comes first, then
    /// shuts down.
    ///
    /// After an OS signal a second one terminates the process immediately.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Signal`] if the signal handlers cannot be installed
    /// - [`ServerError::Accept`] if the accept loop failed; the server is
    ///   `Stopped` without draining
    /// - [`ServerError::ShutdownTimeout`] if requests were still running at
    ///   the deadline
    pub async fn await_shutdown(&mut self, cancel: &ShutdownSignal) -> ServerResult<()> {
        let mut signals = OsSignals::register().map_err(ServerError::Signal)?;
        let fatal_rx = self.fatal.take();
        let fatal = async move {
            match fatal_rx {
                Some(rx) => rx.await.ok(),
                None => None,
            }
        };

        tokio::select! {
            signal = signals.recv() => {
                tracing::info!(
                    signal = %signal,
                    active = self.active_connections(),
                    "shutting down server"
                );
                let _watcher = signals.escalate();
            }
            () = cancel.recv() => {
                tracing::info!(active = self.active_connections(), "shutting down server, cancelled");
            }
            Some(err) = fatal => {
                self.state.stop();
                self.stop.trigger();
                return Err(ServerError::Accept(err));
            }
        }

        self.shutdown().await
    }

    /// Stops accepting connections and waits for in-flight requests.
    ///
    /// New connections are refused as soon as this is called. Idle
    /// keep-alive connections close immediately; busy ones close after
    /// their current response. Calling it again, or after the server has
    /// stopped, does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ShutdownTimeout`] if connections are still open
    /// when the shutdown timeout expires. The server is `Stopped` either way.
    pub async fn shutdown(&mut self) -> ServerResult<()> {
        if !self
            .state
            .transition(ServerState::Serving, ServerState::ShuttingDown)
        {
            return Ok(());
        }

        self.stop.trigger();
        if let Some(task) = self.accept_task.take() {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "accept loop panicked");
            }
        }

        tracing::debug!(
            active = self.active_connections(),
            timeout = ?self.shutdown_timeout,
            "waiting for connections to close"
        );

        let drained = tokio::select! {
            () = self.tracker.wait_for_shutdown() => true,
            () = tokio::time::sleep(self.shutdown_timeout) => false,
        };
        self.state.stop();

        if drained {
            tracing::info!("server stopped");
            Ok(())
        } else {
            let active = self.active_connections();
            tracing::error!(active, "server shutdown timed out");
            Err(ServerError::ShutdownTimeout { active })
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.stop.trigger();
        self.state.stop();
    }
}

/// Binds the listen socket.
///
/// A bare `:port` tries the IPv6 wildcard first, which also takes IPv4
/// traffic on dual-stack hosts, then falls back to the IPv4 wildcard.
async fn bind(config: &ServerConfig) -> io::Result<TcpListener> {
    match config.wildcard_port() {
        Some(port) => {
            let addrs = [
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            ];
            TcpListener::bind(&addrs[..]).await
        }
        None => TcpListener::bind(config.http_addr()).await,
    }
}

async fn accept_loop<A: Acceptor>(
    mut acceptor: A,
    shared: Arc<Shared>,
    fatal: oneshot::Sender<io::Error>,
) {
    let mut backoff = None;
    loop {
        let accepted = tokio::select! {
            biased;
            () = shared.stop.recv() => break,
            accepted = acceptor.accept() => accepted,
        };

        match accepted {
            Ok((stream, remote)) => {
                backoff = None;
                let token = shared.tracker.acquire();
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    serve_connection(stream, remote, shared).await;
                    drop(token);
                });
            }
            Err(err) if is_transient(&err) => {
                tracing::debug!(error = %err, "connection dropped before accept");
            }
            Err(err) if is_exhausted(&err) => {
                let delay = next_backoff(backoff);
                backoff = Some(delay);
                tracing::warn!(error = %err, retry_in = ?delay, "accept failed, retrying");
                tokio::select! {
                    biased;
                    () = shared.stop.recv() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to accept connection");
                // The receiver is gone only if the handle was dropped.
                let _ = fatal.send(err);
                return;
            }
        }
    }
    tracing::debug!("accept loop stopped");
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Returns `true` for errors that mean the process or host is out of
/// descriptors or buffers. Those clear once connections close.
#[cfg(unix)]
fn is_exhausted(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_exhausted(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::OutOfMemory
}

fn next_backoff(previous: Option<Duration>) -> Duration {
    previous.map_or(ACCEPT_BACKOFF_MIN, |delay| (delay * 2).min(ACCEPT_BACKOFF_MAX))
}

async fn serve_connection(stream: TcpStream, remote: SocketAddr, shared: Arc<Shared>) {
    let io = TokioIo::new(stream);
    let stop = shared.stop.clone();
    let keep_alive = shared.config.keep_alive();
    let header_read_timeout = shared.config.header_read_timeout();

    let service = service_fn(move |req: http::Request<Incoming>| {
        let shared = Arc::clone(&shared);
        async move { Ok::<_, Infallible>(handle_request(&shared, req, remote).await) }
    });

    let mut builder = http1::Builder::new();
    builder
        .keep_alive(keep_alive)
        .timer(TokioTimer::new())
        .header_read_timeout(header_read_timeout);

    let conn = builder.serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        () = stop.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(err) = result {
        tracing::debug!(remote = %remote, error = %err, "connection closed with error");
    }
}

async fn handle_request(
    shared: &Shared,
    req: http::Request<Incoming>,
    remote: SocketAddr,
) -> Response {
    let (mut parts, body) = req.into_parts();
    parts.extensions.insert(RemoteAddr(remote));

    let collected = tokio::time::timeout(shared.config.header_read_timeout(), body.collect()).await;
    match collected {
        Ok(Ok(body)) => {
            let request = Request::from_parts(parts, Full::new(body.to_bytes()));
            shared.pipeline.dispatch(request).await
        }
        Ok(Err(err)) => {
            let request = Request::from_parts(parts, Full::new(Bytes::new()));
            let response = error_response(StatusCode::BAD_REQUEST, "unable to read request body");
            tracing::debug!(error = %err, "unable to read request body");
            shared.pipeline.reject(request, response).await
        }
        Err(_) => {
            let request = Request::from_parts(parts, Full::new(Bytes::new()));
            let response = error_response(StatusCode::REQUEST_TIMEOUT, "request body timed out");
            shared.pipeline.reject(request, response).await
        }
    }
}
