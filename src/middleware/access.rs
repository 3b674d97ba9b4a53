//! Request and access logging middleware.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode, Version};
use tracing::info;

use super::Middleware;
use super::capture::ResponseLogger;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Pass-through hook on the way in. Calls the next handler and nothing else.
pub fn log_request(next: BoxedHandler) -> BoxedHandler {
    BoxedHandler::new(move |w: &mut dyn ResponseWriter, req: &Request| next.serve(w, req))
}

/// Access logging with the default [`TracingLog`] sink.
pub fn log_response(next: BoxedHandler) -> BoxedHandler {
    LogResponse::new().wrap(next)
}

// ── Access log sink ───────────────────────────────────────────────────────────

/// One finished request, as seen from the outside.
///
/// Its [`Display`](fmt::Display) form is the classic access log line:
///
/// ```text
/// 127.0.0.1:50412 - HTTP/1.1 GET /hello - Status: 200, Size: 15, Duration: 41.2µs
/// ```
#[derive(Clone, Debug)]
pub struct AccessEntry<'a> {
    pub remote_addr: SocketAddr,
    pub version: Version,
    pub method: &'a Method,
    pub target: &'a str,
    pub status: StatusCode,
    pub size: usize,
    pub duration: Duration,
}

impl fmt::Display for AccessEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {:?} {} {} - Status: {}, Size: {}, Duration: {:?}",
            self.remote_addr,
            self.version,
            self.method,
            self.target,
            self.status.as_u16(),
            self.size,
            self.duration,
        )
    }
}

/// Where [`LogResponse`] sends its records.
///
/// Implemented for closures, which keeps tests free of global subscribers:
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use mlog::middleware::{AccessEntry, LogResponse};
///
/// let lines = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&lines);
/// let layer = LogResponse::with_log(move |entry: &AccessEntry<'_>| {
///     sink.lock().unwrap().push(entry.to_string());
/// });
/// # drop(layer);
/// ```
pub trait AccessLog: Send + Sync + 'static {
    fn record(&self, entry: &AccessEntry<'_>);
}

impl<F> AccessLog for F
where
    F: Fn(&AccessEntry<'_>) + Send + Sync + 'static,
{
    fn record(&self, entry: &AccessEntry<'_>) {
        self(entry)
    }
}

/// Emits each record as an `INFO` event on the `mlog::access` target, with
/// the fields attached for structured subscribers.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

impl AccessLog for TracingLog {
    fn record(&self, entry: &AccessEntry<'_>) {
        info!(
            target: "mlog::access",
            remote_addr = %entry.remote_addr,
            version = ?entry.version,
            method = %entry.method,
            target_uri = entry.target,
            status = entry.status.as_u16(),
            size = entry.size,
            duration = ?entry.duration,
            "{entry}"
        );
    }
}

// ── LogResponse ───────────────────────────────────────────────────────────────

/// Writes one access log record per request, after the handler returns.
///
/// The inner handler sees a [`ResponseLogger`] in place of the real writer.
/// A handler that never set a status is answered with `200 OK`, unless it
/// hijacked the connection.
#[derive(Clone)]
pub struct LogResponse {
    log: Arc<dyn AccessLog>,
}

impl LogResponse {
    pub fn new() -> Self {
        Self::with_log(TracingLog)
    }

    pub fn with_log(log: impl AccessLog) -> Self {
        Self { log: Arc::new(log) }
    }
}

impl Default for LogResponse {
    fn default() -> Self { Self::new() }
}

impl Middleware for LogResponse {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let log = Arc::clone(&self.log);
        BoxedHandler::new(move |w: &mut dyn ResponseWriter, req: &Request| {
            let start = Instant::now();
            let mut rl = ResponseLogger::new(w);

            next.serve(&mut rl, req);

            if !rl.wrote_header() && !rl.hijacked() {
                rl.write_header(StatusCode::OK);
            }

            let target = req.request_uri();
            log.record(&AccessEntry {
                remote_addr: req.remote_addr(),
                version: req.version(),
                method: req.method(),
                target: &target,
                status: rl.status(),
                size: rl.size(),
                duration: start.elapsed(),
            });
        })
    }
}
