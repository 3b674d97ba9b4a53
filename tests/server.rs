use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::StatusCode;
use http::header::{CONNECTION, HeaderValue, UPGRADE};
use hyper_util::rt::TokioIo;
use mlog::middleware::{AccessEntry, Chain, LogResponse, log_request, recover_panic};
use mlog::{Handler, Request, ResponseWriter, Router, Server, error};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Lines = Arc<Mutex<Vec<String>>>;

struct TestServer {
    addr: SocketAddr,
    lines: Lines,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), mlog::Error>>,
}

impl TestServer {
    /// Serves `app` behind the full stack, with access lines captured.
    async fn start(app: impl Handler) -> Self {
        Self::start_with(app, |server| server).await
    }

    async fn start_with(app: impl Handler, configure: impl FnOnce(Server) -> Server) -> Self {
        let lines = Lines::default();
        let sink = Arc::clone(&lines);
        let chain = Chain::new()
            .with(log_request)
            .with(LogResponse::with_log(move |entry: &AccessEntry<'_>| {
                sink.lock().unwrap().push(entry.to_string());
            }))
            .with(recover_panic);
        Self::start_configured(chain.then(app), lines, configure).await
    }

    async fn start_raw(handler: impl Handler, lines: Lines) -> Self {
        Self::start_configured(handler, lines, |server| server).await
    }

    async fn start_configured(
        handler: impl Handler,
        lines: Lines,
        configure: impl FnOnce(Server) -> Server,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, rx) = oneshot::channel::<()>();
        let server = configure(Server::from_listener(listener));
        let task = tokio::spawn(server.serve_with_shutdown(handler, async move {
            let _ = rx.await;
        }));
        Self { addr, lines, shutdown, task }
    }

    /// Sends a raw request and reads until the server closes the connection.
    async fn send(&self, raw: &str) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf)).await;
        assert!(read.is_ok(), "timed out waiting for the server to close");
        String::from_utf8_lossy(&buf).into_owned()
    }

    async fn get(&self, path: &str) -> String {
        self.send(&format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")).await
    }

    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

fn split(response: &str) -> (&str, &str) {
    response.split_once("\r\n\r\n").unwrap_or((response, ""))
}

fn hello(w: &mut dyn ResponseWriter, _req: &Request) {
    let _ = w.write_all(b"Hello Everyone!");
}

fn welcome(w: &mut dyn ResponseWriter, _req: &Request) {
    let _ = w.write_all(b"You are welcome to use logStack!");
}

fn echo(w: &mut dyn ResponseWriter, req: &Request) {
    let _ = w.write_all(req.body());
}

fn boom(_w: &mut dyn ResponseWriter, _req: &Request) {
    panic!("boom");
}

fn upgrade(w: &mut dyn ResponseWriter, _req: &Request) {
    match w.hijack() {
        Ok(on_upgrade) => {
            // Still sent: they go out with the 101.
            w.headers_mut().insert(CONNECTION, HeaderValue::from_static("upgrade"));
            w.headers_mut().insert(UPGRADE, HeaderValue::from_static("greeting"));
            tokio::spawn(async move {
                if let Ok(upgraded) = on_upgrade.await {
                    let mut io = TokioIo::new(upgraded);
                    let _ = io.write_all(b"taken over").await;
                    let _ = io.shutdown().await;
                }
            });
        }
        Err(e) => error(w, &e.to_string(), StatusCode::NOT_IMPLEMENTED),
    }
}

fn app() -> Router {
    Router::new()
        .get("/hello", hello)
        .get("/welcome", welcome)
        .get("/panic", boom)
        .get("/upgrade", upgrade)
        .post("/echo", echo)
}

#[tokio::test]
async fn hello_is_served_and_logged() {
    let server = TestServer::start(app()).await;

    let response = server.get("/hello").await;
    let (head, body) = split(&response);
    assert!(head.starts_with("HTTP/1.1 200 OK"), "{head}");
    assert_eq!(body, "Hello Everyone!");

    let lines = server.lines.lock().unwrap().clone();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("127.0.0.1:"), "{}", lines[0]);
    assert!(
        lines[0].contains(" - HTTP/1.1 GET /hello - Status: 200, Size: 15, Duration: "),
        "{}",
        lines[0]
    );

    server.stop().await;
}

#[tokio::test]
async fn welcome_is_served() {
    let server = TestServer::start(app()).await;

    let response = server.get("/welcome").await;
    assert_eq!(split(&response).1, "You are welcome to use logStack!");

    server.stop().await;
}

#[tokio::test]
async fn panic_is_contained_and_server_keeps_serving() {
    let server = TestServer::start(app()).await;

    let response = server.get("/panic").await;
    let (head, body) = split(&response);
    assert!(head.starts_with("HTTP/1.1 500 Internal Server Error"), "{head}");
    assert!(head.to_ascii_lowercase().contains("connection: close"), "{head}");
    assert_eq!(body, "Internal Server Error: boom");

    let response = server.get("/hello").await;
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(split(&response).1, "Hello Everyone!");

    let lines = server.lines.lock().unwrap().clone();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("GET /panic - Status: 500"), "{}", lines[0]);

    server.stop().await;
}

#[tokio::test]
async fn unrecovered_panic_drops_only_its_connection() {
    let server = TestServer::start_raw(app(), Lines::default()).await;

    let response = server.get("/panic").await;
    assert!(!response.starts_with("HTTP/1.1 200"), "{response}");

    let response = server.get("/hello").await;
    assert_eq!(split(&response).1, "Hello Everyone!");

    server.stop().await;
}

#[tokio::test]
async fn missing_route_is_404_and_logged() {
    let server = TestServer::start(app()).await;

    let response = server.get("/missing?x=1").await;
    let (head, body) = split(&response);
    assert!(head.starts_with("HTTP/1.1 404 Not Found"), "{head}");
    assert_eq!(body, "404 page not found");

    let lines = server.lines.lock().unwrap().clone();
    assert!(lines[0].contains("GET /missing?x=1 - Status: 404, Size: 18"), "{}", lines[0]);

    server.stop().await;
}

#[tokio::test]
async fn hijack_hands_over_the_connection() {
    let server = TestServer::start(app()).await;

    let response = server
        .send("GET /upgrade HTTP/1.1\r\nHost: test\r\nConnection: upgrade\r\nUpgrade: greeting\r\n\r\n")
        .await;
    let (head, body) = split(&response);
    assert!(head.starts_with("HTTP/1.1 101 Switching Protocols"), "{head}");
    assert!(head.to_ascii_lowercase().contains("upgrade: greeting"), "{head}");
    assert_eq!(body, "taken over");
    assert_eq!(server.lines.lock().unwrap().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn hijack_without_upgrade_request_is_unsupported() {
    let server = TestServer::start(app()).await;

    let response = server.get("/upgrade").await;
    let (head, body) = split(&response);
    assert!(head.starts_with("HTTP/1.1 501 Not Implemented"), "{head}");
    assert_eq!(body, "response writer does not support connection takeover");

    server.stop().await;
}

#[tokio::test]
async fn shutdown_closes_idle_keep_alive_connections() {
    let server = TestServer::start(app()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"GET /hello HTTP/1.1\r\nHost: test\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.ends_with(b"Hello Everyone!") {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .expect("response within 5s")
            .unwrap();
        assert!(n > 0, "connection closed before the response was complete");
        buf.extend_from_slice(&chunk[..n]);
    }

    // The connection is now idle but still open.
    let stopped = tokio::time::timeout(Duration::from_secs(5), server.stop()).await;
    assert!(stopped.is_ok(), "serve did not return with an idle keep-alive connection");

    let mut rest = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await;
    assert!(closed.is_ok(), "idle connection was left open after shutdown");
}

#[tokio::test]
async fn request_body_reaches_the_handler() {
    let server = TestServer::start(app()).await;

    let response = server
        .send("POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello")
        .await;
    let (head, body) = split(&response);
    assert!(head.starts_with("HTTP/1.1 200 OK"), "{head}");
    assert_eq!(body, "hello");

    server.stop().await;
}

#[tokio::test]
async fn oversized_body_is_rejected_before_the_handler() {
    let server = TestServer::start_with(app(), |s| s.max_body_size(8)).await;

    let payload = "x".repeat(32);
    let response = server
        .send(&format!(
            "POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: {}\r\n\r\n{payload}",
            payload.len()
        ))
        .await;
    let (head, body) = split(&response);
    assert!(head.starts_with("HTTP/1.1 413 Payload Too Large"), "{head}");
    assert!(head.to_ascii_lowercase().contains("connection: close"), "{head}");
    assert_eq!(body, "request body too large");
    assert!(server.lines.lock().unwrap().is_empty(), "the handler chain must not run");

    server.stop().await;
}

#[test]
fn bind_rejects_bad_address() {
    assert!(matches!(Server::bind("localhost"), Err(mlog::Error::Addr(_))));
}
