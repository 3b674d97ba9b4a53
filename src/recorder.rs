//! In-memory [`ResponseWriter`] for testing handlers and middleware.

use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;

use crate::error::Error;
use crate::response::ResponseWriter;

/// Records everything a handler writes so tests can assert on it.
///
/// ```rust
/// use mlog::{Request, ResponseRecorder, Handler};
/// use http::Method;
///
/// fn hello(w: &mut dyn mlog::ResponseWriter, _req: &Request) {
///     let _ = w.write_all(b"Hello Everyone!");
/// }
///
/// let mut rec = ResponseRecorder::new();
/// hello.serve(&mut rec, &Request::new(Method::GET, "/hello".parse().unwrap()));
/// assert_eq!(rec.status(), 200);
/// assert_eq!(rec.body_str(), "Hello Everyone!");
/// ```
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    hijackable: bool,
    hijacked: bool,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes [`hijack`](ResponseWriter::hijack) succeed.
    ///
    /// There is no real connection behind a recorder: the returned
    /// [`OnUpgrade`] resolves to an error if awaited.
    pub fn hijackable(mut self) -> Self {
        self.hijackable = true;
        self
    }

    /// The committed status, or `200 OK` if the handler never set one.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Whether a status line was committed, explicitly or by a write.
    pub fn wrote_header(&self) -> bool {
        self.status.is_some()
    }

    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() && !self.hijacked {
            self.status = Some(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.hijacked {
            return Err(std::io::Error::other(Error::Hijacked));
        }
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        if !self.hijackable {
            return Err(Error::HijackUnsupported);
        }
        if self.hijacked {
            return Err(Error::Hijacked);
        }
        self.hijacked = true;
        Ok(hyper::upgrade::on(http::Request::new(())))
    }
}
