//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! Middleware wraps handlers of *different* concrete types, and the router
//! keeps them side by side in one radix tree per method. Both need a single
//! type, so every handler is erased into a [`BoxedHandler`]:
//!
//! ```text
//! fn hello(w: &mut dyn ResponseWriter, req: &Request) { … }   ← user writes this
//!        ↓ router.get("/hello", hello)
//! BoxedHandler::new(hello)                                  ← Arc<dyn Handler>
//!        ↓ middleware.wrap(boxed)
//! BoxedHandler::new(move |w, req| { …; next.serve(w, req); … })
//!        ↓
//! handler.serve(&mut writer, &request)  at request time     ← one vtable call per layer
//! ```
//!
//! Handlers are plain synchronous functions. The server runs each request's
//! chain on tokio's blocking pool, so a handler may block without stalling
//! other connections.

use std::fmt;
use std::sync::Arc;

use crate::request::Request;
use crate::response::ResponseWriter;

/// A unit of request-processing logic.
///
/// Automatically implemented for every function or closure with the
/// signature:
///
/// ```text
/// Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static
/// ```
///
/// Closures must spell out their argument types so the compiler picks the
/// higher-ranked signature:
///
/// ```rust
/// use mlog::{BoxedHandler, Request, ResponseWriter};
///
/// let greeting = String::from("hi");
/// let handler = BoxedHandler::new(move |w: &mut dyn ResponseWriter, _req: &Request| {
///     let _ = w.write_all(greeting.as_bytes());
/// });
/// # drop(handler);
/// ```
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request);
}

impl<F> Handler for F
where
    F: Fn(&mut dyn ResponseWriter, &Request) + Send + Sync + 'static,
{
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request) {
        self(w, req)
    }
}

/// A heap-allocated, type-erased handler shared across concurrent requests.
///
/// Cloning is one atomic reference count increment.
#[derive(Clone)]
pub struct BoxedHandler(Arc<dyn Handler>);

impl BoxedHandler {
    pub fn new(handler: impl Handler) -> Self {
        Self(Arc::new(handler))
    }
}

impl Handler for BoxedHandler {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request) {
        self.0.serve(w, req)
    }
}

impl fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedHandler")
    }
}
