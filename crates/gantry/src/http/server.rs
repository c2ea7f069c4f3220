//! Graceful HTTP runnable.
//!
//! `begin` binds and serves until halted. `halt` swaps in the draining
//! handler, waits out the grace period, closes the listener and then lets
//! `begin` wait for in-flight connections up to the shutdown deadline.

use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use gantry_config::{
    Config, DEFAULT_GRACE_PERIOD_MS, DEFAULT_SHUTDOWN_TIMEOUT_MS, ListenAddress,
};

use super::HTTP_TARGET;
use super::codec::{CodecError, Request, Response, read_request, write_response};
use super::handler::{
    RequestHandler, UnavailableHandler, bad_request, content_too_large, internal_error,
};
use super::inflight::InFlight;
use crate::error::RunError;
use crate::runnable::{Runnable, Unit};
use crate::sync::{lock, wait_timeout_while, wait_while};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_NAME: &str = "http";

/// Address and shutdown timings for an [`HttpServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerConfig {
    address: ListenAddress,
    grace_period: Duration,
    shutdown_deadline: Duration,
}

impl HttpServerConfig {
    /// Default timings for the given address.
    #[must_use]
    pub const fn new(address: ListenAddress) -> Self {
        Self {
            address,
            grace_period: Duration::from_millis(DEFAULT_GRACE_PERIOD_MS),
            shutdown_deadline: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        }
    }

    /// Sets how long the server keeps answering with the draining handler
    /// before closing its listener.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Sets how long in-flight connections may run after the listener closed.
    #[must_use]
    pub fn with_shutdown_deadline(mut self, deadline: Duration) -> Self {
        self.shutdown_deadline = deadline;
        self
    }

    /// Listen address.
    #[must_use]
    pub const fn address(&self) -> &ListenAddress {
        &self.address
    }

    /// Drain grace period.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// In-flight shutdown deadline.
    #[must_use]
    pub const fn shutdown_deadline(&self) -> Duration {
        self.shutdown_deadline
    }
}

impl From<&Config> for HttpServerConfig {
    fn from(config: &Config) -> Self {
        Self::new(config.addr().clone())
            .with_grace_period(config.grace_period())
            .with_shutdown_deadline(config.shutdown_timeout())
    }
}

/// Observable state of one server instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not bound yet.
    Idle,
    /// Serving with the normal handler.
    Listening,
    /// Answering new connections with `503` until the grace period ends.
    Draining,
    /// Listener closed; `begin` has returned or never bound.
    Closed,
}

impl ServerState {
    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Runnable serving HTTP with a drain phase on halt.
pub struct HttpServer {
    name: String,
    config: HttpServerConfig,
    handler: Arc<dyn RequestHandler>,
}

impl HttpServer {
    /// Builds a graceful server.
    pub fn new(config: HttpServerConfig, handler: impl RequestHandler + 'static) -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            config,
            handler: Arc::new(handler),
        }
    }

    /// Builds a server that closes its listener as soon as it is halted,
    /// without a drain grace period.
    pub fn immediate(address: ListenAddress, handler: impl RequestHandler + 'static) -> Self {
        Self::new(
            HttpServerConfig::new(address).with_grace_period(Duration::ZERO),
            handler,
        )
    }

    /// Renames the server in logs and failure reports.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpServerConfig {
        &self.config
    }

    /// Instantiates the server, keeping the concrete unit type.
    #[must_use]
    pub fn start(&self) -> Arc<HttpServerUnit> {
        Arc::new(HttpServerUnit {
            name: self.name.clone(),
            config: self.config.clone(),
            shared: Arc::new(Shared {
                normal: Arc::clone(&self.handler),
                draining: OnceCell::new(),
                inflight: Arc::new(InFlight::default()),
            }),
            shutdown: AtomicBool::new(false),
            status: Mutex::new(Status {
                state: ServerState::Idle,
                local_addr: None,
                abandoned: 0,
            }),
            changed: Condvar::new(),
            halted: OnceCell::new(),
        })
    }
}

impl Runnable for HttpServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Arc<dyn Unit> {
        self.start()
    }
}

struct Shared {
    normal: Arc<dyn RequestHandler>,
    draining: OnceCell<Arc<dyn RequestHandler>>,
    inflight: Arc<InFlight>,
}

impl Shared {
    fn active(&self) -> Arc<dyn RequestHandler> {
        Arc::clone(self.draining.get().unwrap_or(&self.normal))
    }
}

struct Status {
    state: ServerState,
    local_addr: Option<SocketAddr>,
    abandoned: usize,
}

/// One instantiation of an [`HttpServer`].
pub struct HttpServerUnit {
    name: String,
    config: HttpServerConfig,
    shared: Arc<Shared>,
    shutdown: AtomicBool,
    status: Mutex<Status>,
    changed: Condvar,
    halted: OnceCell<usize>,
}

impl HttpServerUnit {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        lock(&self.status).state
    }

    /// Bound address, once listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.status).local_addr
    }

    /// Waits until `begin` has bound or given up. Returns the bound address,
    /// or `None` on timeout or bind failure.
    #[must_use]
    pub fn wait_listening(&self, timeout: Duration) -> Option<SocketAddr> {
        let guard = lock(&self.status);
        let (status, _timed_out) = wait_timeout_while(&self.changed, guard, timeout, |current| {
            current.state == ServerState::Idle
        });
        status.local_addr
    }

    /// Connections accepted and not yet answered.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.inflight.count()
    }

    fn listen(&self) -> Result<Option<TcpListener>, RunError> {
        let mut status = lock(&self.status);
        if status.state != ServerState::Idle {
            debug!(
                target: HTTP_TARGET,
                unit = %self.name,
                state = %status.state,
                "server already started or halted; not binding"
            );
            return Ok(None);
        }
        match bind(&self.config.address) {
            Ok((listener, addr)) => {
                status.state = ServerState::Listening;
                status.local_addr = Some(addr);
                self.changed.notify_all();
                info!(
                    target: HTTP_TARGET,
                    unit = %self.name,
                    address = %addr,
                    "http server listening"
                );
                Ok(Some(listener))
            }
            Err(error) => {
                status.state = ServerState::Closed;
                self.changed.notify_all();
                Err(error)
            }
        }
    }

    fn accept_loop(&self, listener: &TcpListener) {
        let mut last_error = None::<io::ErrorKind>;
        while !self.shutdown.load(Ordering::SeqCst) {
            match accept_connection(listener) {
                Ok(Some(stream)) => {
                    last_error = None;
                    self.dispatch(stream);
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(
                            target: HTTP_TARGET,
                            unit = %self.name,
                            error = %error,
                            "http accept error"
                        );
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
    }

    fn dispatch(&self, stream: TcpStream) {
        // The handler is chosen at accept time so a connection accepted
        // before the drain keeps the normal handler.
        let guard = self.shared.inflight.enter();
        let handler = self.shared.active();
        let spawned = thread::Builder::new()
            .name(format!("{}-conn", self.name))
            .spawn(move || {
                serve_connection(stream, handler.as_ref());
                drop(guard);
            });
        if let Err(error) = spawned {
            warn!(
                target: HTTP_TARGET,
                unit = %self.name,
                error = %error,
                "failed to spawn connection thread; dropping connection"
            );
        }
    }

    fn close(&self) {
        let abandoned = self
            .shared
            .inflight
            .wait_idle(self.config.shutdown_deadline);
        if abandoned > 0 {
            warn!(
                target: HTTP_TARGET,
                unit = %self.name,
                abandoned,
                deadline = ?self.config.shutdown_deadline,
                "shutdown deadline expired with requests in flight"
            );
        }
        let mut status = lock(&self.status);
        status.state = ServerState::Closed;
        status.abandoned = abandoned;
        self.changed.notify_all();
        info!(target: HTTP_TARGET, unit = %self.name, "http server closed");
    }

    fn drain(&self) -> usize {
        let mut guard = lock(&self.status);
        let state = guard.state;
        match state {
            ServerState::Idle => {
                guard.state = ServerState::Closed;
                self.changed.notify_all();
                debug!(
                    target: HTTP_TARGET,
                    unit = %self.name,
                    "halted before listening"
                );
                return 0;
            }
            ServerState::Draining | ServerState::Closed => return guard.abandoned,
            ServerState::Listening => {}
        }

        let _ = self.shared.draining.set(Arc::new(UnavailableHandler));
        guard.state = ServerState::Draining;
        self.changed.notify_all();
        info!(
            target: HTTP_TARGET,
            unit = %self.name,
            grace_period = ?self.config.grace_period,
            in_flight = self.shared.inflight.count(),
            "draining http server"
        );

        let (after_grace, _grace_elapsed) = wait_timeout_while(
            &self.changed,
            guard,
            self.config.grace_period,
            |current| current.state != ServerState::Closed,
        );
        drop(after_grace);
        self.shutdown.store(true, Ordering::SeqCst);

        let closed = wait_while(&self.changed, lock(&self.status), |current| {
            current.state != ServerState::Closed
        });
        closed.abandoned
    }
}

impl Unit for HttpServerUnit {
    fn begin(&self) -> Result<(), RunError> {
        let Some(listener) = self.listen()? else {
            return Ok(());
        };
        self.accept_loop(&listener);
        drop(listener);
        self.close();
        Ok(())
    }

    fn halt(&self) -> Result<(), RunError> {
        let abandoned = *self.halted.get_or_init(|| self.drain());
        if abandoned == 0 {
            Ok(())
        } else {
            Err(RunError::ShutdownDeadline {
                remaining: abandoned,
                deadline: self.config.shutdown_deadline,
            })
        }
    }
}

fn bind(address: &ListenAddress) -> Result<(TcpListener, SocketAddr), RunError> {
    let mut addrs = (address.host(), address.port())
        .to_socket_addrs()
        .map_err(|source| RunError::Resolve {
            address: address.to_string(),
            source,
        })?;
    let addr = addrs
        .next()
        .ok_or_else(|| RunError::ResolveEmpty {
            address: address.to_string(),
        })?;
    let listener = TcpListener::bind(addr).map_err(|source| RunError::Bind { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| RunError::NonBlocking { source })?;
    let bound = listener
        .local_addr()
        .map_err(|source| RunError::Bind { addr, source })?;
    Ok((listener, bound))
}

fn accept_connection(listener: &TcpListener) -> Result<Option<TcpStream>, io::Error> {
    match listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

fn serve_connection(mut stream: TcpStream, handler: &dyn RequestHandler) {
    if let Err(error) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
        warn!(target: HTTP_TARGET, error = %error, "failed to set read timeout");
        return;
    }
    let response = match read_request(&mut stream) {
        Ok(Some(request)) => respond(handler, &request),
        Ok(None) => return,
        Err(CodecError::Io(error)) => {
            debug!(target: HTTP_TARGET, error = %error, "connection read failed");
            return;
        }
        Err(CodecError::TooLarge) => content_too_large(),
        Err(error @ CodecError::Malformed(_)) => bad_request(&error.to_string()),
    };
    if let Err(error) = write_response(&mut stream, &response) {
        debug!(target: HTTP_TARGET, error = %error, "connection write failed");
    }
}

fn respond(handler: &dyn RequestHandler, request: &Request) -> Response {
    let response = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request)))
        .unwrap_or_else(|_| {
            warn!(
                target: HTTP_TARGET,
                method = request.method(),
                path = request.path(),
                "request handler panicked"
            );
            internal_error()
        });
    debug!(
        target: HTTP_TARGET,
        method = request.method(),
        path = request.path(),
        status = response.status(),
        "request served"
    );
    response
}
