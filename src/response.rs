//! The response sink handed to every handler, and the server's own
//! implementation of it.
//!
//! A handler never builds a response value. It writes to a
//! [`ResponseWriter`]: headers first, then an optional status, then body
//! bytes. Middleware substitutes its own writer to observe or reshape that
//! stream.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use hyper::upgrade::OnUpgrade;
use tracing::warn;

use crate::error::Error;

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The sink a handler writes its response to.
///
/// The status line is committed by the first call to
/// [`write_header`](ResponseWriter::write_header), or implicitly as `200 OK`
/// by the first [`write`](ResponseWriter::write). Later status changes are
/// ignored.
///
/// Headers are buffered: nothing reaches the wire until the handler chain
/// returns, so header edits made after the commit are still sent with the
/// status line.
pub trait ResponseWriter {
    /// Headers that will be sent with the status line.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commits the status line. Only the first call has any effect.
    fn write_header(&mut self, status: StatusCode);

    /// Appends body bytes, committing `200 OK` first if no status was set.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Hands the underlying connection to another protocol.
    ///
    /// On success the returned future resolves to the raw connection once
    /// the server has answered `101 Switching Protocols`. Writers without a
    /// connection to give away return [`Error::HijackUnsupported`].
    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        Err(Error::HijackUnsupported)
    }

    /// Writes the whole buffer, retrying short writes.
    fn write_all(&mut self, mut buf: &[u8]) -> std::io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => return Err(std::io::ErrorKind::WriteZero.into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }
}

/// Replies with a plain-text error message and the given status.
///
/// The body is exactly `message`; no trailing newline is added.
///
/// ```rust
/// use mlog::{ResponseRecorder, error};
/// use http::StatusCode;
///
/// let mut rec = ResponseRecorder::new();
/// error(&mut rec, "Method Not Allowed", StatusCode::METHOD_NOT_ALLOWED);
/// assert_eq!(rec.status(), StatusCode::METHOD_NOT_ALLOWED);
/// assert_eq!(rec.body(), b"Method Not Allowed");
/// ```
pub fn error(w: &mut dyn ResponseWriter, message: &str, status: StatusCode) {
    let headers = w.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    w.write_header(status);
    if let Err(e) = w.write_all(message.as_bytes()) {
        warn!("failed to write error response: {e}");
    }
}

// ── Server-side writer ────────────────────────────────────────────────────────

/// The writer the server hands to the outermost handler of each request.
///
/// The body is buffered and sent once the handler chain returns.
pub(crate) struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    upgrade: Option<OnUpgrade>,
    hijacked: bool,
}

impl Response {
    /// `upgrade` is present only for HTTP/1.1 requests; HTTP/2 `CONNECT`
    /// requests are never handed one.
    pub(crate) fn new(upgrade: Option<OnUpgrade>) -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            upgrade,
            hijacked: false,
        }
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let status = if self.hijacked {
            StatusCode::SWITCHING_PROTOCOLS
        } else {
            self.status.unwrap_or(StatusCode::OK)
        };

        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for Response {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.hijacked {
            warn!(%status, "write_header called on a hijacked connection");
            return;
        }
        if let Some(sent) = self.status {
            warn!(%sent, ignored = %status, "superfluous write_header call");
            return;
        }
        self.status = Some(status);
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
        if self.hijacked {
            return Err(Error::Hijacked);
        }
        if self.status.is_some() {
            return Err(Error::HijackAfterHeader);
        }
        let upgrade = self.upgrade.take().ok_or(Error::HijackUnsupported)?;
        self.hijacked = true;
        Ok(upgrade)
    }
}
