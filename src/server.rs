//! HTTP server and graceful shutdown.
//!
//! The server owns the transport: it accepts connections, reads each
//! request body, hands a fresh [`ResponseWriter`] to the handler chain and
//! sends whatever the chain wrote. Everything between "request in" and
//! "response out" belongs to the handlers and middleware.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **SIGINT** the server:
//! 1. Immediately stops `listener.accept()` — no new connections are made.
//! 2. Tells every open connection to finish: idle keep-alive connections
//!    close at once, busy ones after their in-flight request.
//! 3. Returns from [`Server::serve`] once the last connection is gone.

use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{CONNECTION, HeaderValue};
use http::{StatusCode, Version};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{Response, ResponseWriter, error};

/// Request bodies larger than this are answered with `413` unless
/// [`Server::max_body_size`] says otherwise.
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

enum Listen {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    listen: Listen,
    max_body_size: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use mlog::Server;
    /// let server = Server::bind("0.0.0.0:6862").unwrap();
    /// # drop(server);
    /// assert!(Server::bind(":6862").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        Ok(Self::new(Listen::Addr(addr.parse()?)))
    }

    /// Serves on an already bound listener, e.g. one bound to port 0.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self::new(Listen::Listener(listener))
    }

    fn new(listen: Listen) -> Self {
        Self { listen, max_body_size: DEFAULT_MAX_BODY_SIZE }
    }

    /// Caps the request body the server reads before calling the handler.
    ///
    /// Larger bodies never reach the handler chain: the server answers
    /// `413 Payload Too Large` and closes the connection.
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Starts accepting connections and dispatching them to `handler`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, handler: impl Handler) -> Result<(), Error> {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of on a process signal.
    pub async fn serve_with_shutdown(
        self,
        handler: impl Handler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.listen {
            Listen::Addr(addr) => TcpListener::bind(addr).await?,
            Listen::Listener(listener) => listener,
        };
        let addr = listener.local_addr()?;
        let handler = BoxedHandler::new(handler);
        let max_body_size = self.max_body_size;

        info!(%addr, "mlog listening");

        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
        let builder = ConnBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops
                // accepting, even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let handler = handler.clone();

                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        dispatch(handler.clone(), max_body_size, req, remote_addr)
                    });

                    // Upgrades stay enabled so handlers can hijack.
                    let conn = builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), svc)
                        .into_owned();
                    let conn = graceful.watch(conn);

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        graceful.shutdown().await;
        while tasks.join_next().await.is_some() {}

        info!("mlog stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs one request through the handler chain.
///
/// Handlers are synchronous, so the chain runs on the blocking pool. A
/// panic that escapes every recovery boundary surfaces as
/// [`Error::Handler`]; hyper then drops this connection and the server
/// carries on.
async fn dispatch(
    handler: BoxedHandler,
    max_body_size: usize,
    mut req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Error> {
    let upgrade = take_upgrade(&mut req);
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, max_body_size).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(peer = %remote_addr, limit = max_body_size, "request body too large");
            return Ok(payload_too_large().into_inner());
        }
        Err(e) => return Err(Error::Body(e)),
    };
    let request = Request::from_parts(parts, body, remote_addr);

    let response = tokio::task::spawn_blocking(move || {
        let mut response = Response::new(upgrade);
        handler.serve(&mut response, &request);
        response
    })
    .await
    .inspect_err(|e| error!(peer = %remote_addr, "handler aborted: {e}"))?;

    Ok(response.into_inner())
}

/// The upgrade handle a handler may hijack, if any.
///
/// Only HTTP/1.1 can answer `101 Switching Protocols`. hyper also attaches
/// a handle to HTTP/2 `CONNECT` requests; those are left alone.
fn take_upgrade<B>(req: &mut http::Request<B>) -> Option<OnUpgrade> {
    if req.version() != Version::HTTP_11 {
        return None;
    }
    req.extensions_mut().remove::<OnUpgrade>()
}

/// The unread remainder of the body makes the connection unusable.
fn payload_too_large() -> Response {
    let mut response = Response::new(None);
    response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
    error(&mut response, "request body too large", StatusCode::PAYLOAD_TOO_LARGE);
    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. A handler that fails to install
/// leaves its arm pending forever.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
