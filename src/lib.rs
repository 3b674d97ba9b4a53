//! # mlog
//!
//! Composable HTTP middleware: access logging, panic recovery and
//! after-the-fact response capture, on a thin hyper-based server.
//!
//! ## The model
//!
//! A **handler** writes a response to a [`ResponseWriter`]. A
//! **middleware** takes a handler and returns a handler. A [`Chain`]
//! composes middleware in the order you list them: the first one sees the
//! request first and the response last.
//!
//! Built in:
//!
//! - [`log_request`](middleware::log_request) — pass-through hook
//! - [`log_response`](middleware::log_response) — one access log line per
//!   request: client, protocol, method, target, status, size, duration
//! - [`recover_panic`](middleware::recover_panic) — a panicking handler
//!   becomes `500 Internal Server Error: <message>` and the server keeps going
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mlog::middleware::{Chain, log_request, log_response, recover_panic};
//! use mlog::{Request, ResponseWriter, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mlog::Error> {
//!     let app = Router::new().get("/hello", hello);
//!
//!     let chain = Chain::new()
//!         .with(log_request)
//!         .with(log_response)
//!         .with(recover_panic);
//!
//!     Server::bind("0.0.0.0:6862")?.serve(chain.then(app)).await
//! }
//!
//! fn hello(w: &mut dyn ResponseWriter, _req: &Request) {
//!     let _ = w.write_all(b"Hello Everyone!");
//! }
//! ```

mod error;
mod handler;
mod recorder;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use error::Error;
pub use handler::{BoxedHandler, Handler};
pub use middleware::{Chain, Middleware};
pub use recorder::ResponseRecorder;
pub use request::Request;
pub use response::{ResponseWriter, error};
pub use router::Router;
pub use server::{DEFAULT_MAX_BODY_SIZE, Server};

// Re-exported so downstream code names the same versions of these types.
pub use http;
pub use hyper::upgrade::{OnUpgrade, Upgraded};
