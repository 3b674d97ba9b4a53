//! Middleware layer.
//!
//! A middleware is a function from handler to handler. It receives the next
//! handler in the chain and returns a new handler that does something before
//! and/or after calling it:
//!
//! ```rust
//! use mlog::{BoxedHandler, Handler, Request, ResponseWriter};
//! use mlog::middleware::Chain;
//!
//! fn server_header(next: BoxedHandler) -> BoxedHandler {
//!     BoxedHandler::new(move |w: &mut dyn ResponseWriter, req: &Request| {
//!         w.headers_mut().insert("server", "mlog".parse().unwrap());
//!         next.serve(w, req);
//!     })
//! }
//!
//! let chain = Chain::new()
//!     .with(mlog::middleware::recover_panic)
//!     .with(server_header);
//! # drop(chain);
//! ```
//!
//! Built-in middleware:
//! - [`log_request`] — pass-through hook on the way in
//! - [`LogResponse`] / [`log_response`] — one access log line per request
//! - [`recover_panic`] — turns a panicking handler into a `500`
//!
//! The response capture decorator the access log is built on,
//! [`ResponseLogger`], is public for middleware that needs the same
//! after-the-fact view of a response.

mod capture;
mod access;
mod recover;

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

pub use capture::ResponseLogger;
pub use access::{AccessEntry, AccessLog, LogResponse, TracingLog, log_request, log_response};
pub use recover::recover_panic;

/// Wraps a handler in another handler.
///
/// Implemented for every `Fn(BoxedHandler) -> BoxedHandler`, so plain
/// functions like [`recover_panic`] are middleware as they stand.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// An ordered middleware stack.
///
/// The first middleware added is the outermost: it sees the request first
/// and the response last. A chain is itself a [`Middleware`], so chains
/// nest. An empty chain returns the handler it wraps unchanged.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` inside every middleware already in the chain.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wraps the terminal `handler` in the whole chain.
    pub fn then(&self, handler: impl Handler) -> BoxedHandler {
        self.wrap(BoxedHandler::new(handler))
    }
}

impl Middleware for Chain {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(next, |next, layer| layer.wrap(next))
    }
}

impl FromIterator<Arc<dyn Middleware>> for Chain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Middleware>>>(iter: I) -> Self {
        Self { layers: iter.into_iter().collect() }
    }
}
