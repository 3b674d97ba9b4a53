//! Unified error type.

use std::fmt;

/// The error type returned by mlog's fallible operations.
///
/// Handler faults never show up here: they are turned into `500` responses
/// by [`recover_panic`](crate::middleware::recover_panic). This type covers
/// infrastructure failures (binding, accepting, reading a body) and the
/// connection-takeover contract of [`ResponseWriter::hijack`].
///
/// [`ResponseWriter::hijack`]: crate::ResponseWriter::hijack
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Addr(std::net::AddrParseError),
    /// Reading the request body failed.
    Body(Box<dyn std::error::Error + Send + Sync>),
    /// The handler chain unwound past every recovery boundary.
    Handler(tokio::task::JoinError),
    /// The response writer cannot hand its connection to another protocol.
    HijackUnsupported,
    /// Takeover was requested after the status line had been committed.
    HijackAfterHeader,
    /// The connection was already taken over by an earlier call.
    Hijacked,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Addr(e) => write!(f, "invalid listen address: {e}"),
            Self::Body(e) => write!(f, "request body: {e}"),
            Self::Handler(e) => write!(f, "handler aborted: {e}"),
            Self::HijackUnsupported => {
                f.write_str("response writer does not support connection takeover")
            }
            Self::HijackAfterHeader => {
                f.write_str("cannot take over the connection after the response header was sent")
            }
            Self::Hijacked => f.write_str("connection has already been taken over"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Addr(e) => Some(e),
            Self::Body(e) => Some(e.as_ref()),
            Self::Handler(e) => Some(e),
            Self::HijackUnsupported | Self::HijackAfterHeader | Self::Hijacked => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(e: std::net::AddrParseError) -> Self {
        Self::Addr(e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Handler(e)
    }
}
