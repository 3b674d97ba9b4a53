//! Two greeting endpoints behind the full middleware stack.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example hello
//!
//! Try:
//!   curl http://localhost:6862/hello
//!   curl http://localhost:6862/welcome
//!   curl -X POST http://localhost:6862/hello     # 405
//!
//! Set `MLOG_ADDR` to listen somewhere other than `0.0.0.0:6862`.

use mlog::middleware::{Chain, log_request, log_response, recover_panic};
use mlog::{Request, ResponseWriter, Router, Server};

const DEFAULT_ADDR: &str = "0.0.0.0:6862";

#[tokio::main]
async fn main() -> Result<(), mlog::Error> {
    tracing_subscriber::fmt::init();

    // recover_panic already logs the message; keep only where it happened.
    std::panic::set_hook(Box::new(|info| {
        tracing::debug!(location = ?info.location(), "panic");
    }));

    let app = Router::new()
        .get("/hello", hello)
        .get("/welcome", welcome);

    let chain = Chain::new()
        .with(log_request)
        .with(log_response)
        .with(recover_panic);

    let addr = std::env::var("MLOG_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned());
    Server::bind(&addr)?.serve(chain.then(app)).await
}

// GET /hello
fn hello(w: &mut dyn ResponseWriter, _req: &Request) {
    let _ = w.write_all(b"Hello Everyone!");
}

// GET /welcome
fn welcome(w: &mut dyn ResponseWriter, _req: &Request) {
    let _ = w.write_all(b"You are welcome to use logStack!");
}
