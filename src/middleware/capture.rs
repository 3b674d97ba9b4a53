//! Response capture decorator.

use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;

use crate::error::Error;
use crate::response::ResponseWriter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Unwritten,
    HeaderSent,
    Hijacked,
}

/// Wraps a [`ResponseWriter`] and remembers what went through it.
///
/// Status and byte count are readable after the wrapped handler returns.
/// Every call is forwarded to the inner writer unchanged; the decorator
/// only keeps score.
///
/// The status reads `200 OK` until one is committed. Once the connection is
/// hijacked the decorator stops tracking the status altogether.
pub struct ResponseLogger<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: StatusCode,
    size: usize,
    state: State,
}

impl<'a> ResponseLogger<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: StatusCode::OK,
            size: 0,
            state: State::Unwritten,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Total body bytes accepted by the inner writer.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn wrote_header(&self) -> bool {
        self.state == State::HeaderSent
    }

    pub fn hijacked(&self) -> bool {
        self.state == State::Hijacked
    }
}

impl ResponseWriter for ResponseLogger<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.state != State::Unwritten {
            return;
        }
        self.state = State::HeaderSent;
        self.status = status;
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.state == State::Unwritten {
            self.write_header(StatusCode::OK);
        }
        let n = self.inner.write(buf)?;
        self.size += n;
        Ok(n)
    }

    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        match self.state {
            State::Hijacked => Err(Error::Hijacked),
            State::HeaderSent => Err(Error::HijackAfterHeader),
            State::Unwritten => {
                let upgrade = self.inner.hijack()?;
                self.state = State::Hijacked;
                Ok(upgrade)
            }
        }
    }
}
