//! Incoming HTTP request type.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};

use bytes::Bytes;
use http::{HeaderMap, Method, Uri, Version};

/// An incoming HTTP request with its body fully read.
///
/// Handlers receive it by reference: the same request travels through every
/// middleware in the chain untouched.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) remote_addr: SocketAddr,
    pub(crate) version: Version,
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    /// Builds a request by hand, for driving handlers without a server.
    ///
    /// The remote address defaults to `192.0.2.1:1234` (TEST-NET-1) and the
    /// protocol to `HTTP/1.1`.
    ///
    /// ```rust
    /// use mlog::Request;
    /// use http::Method;
    ///
    /// let req = Request::new(Method::GET, "/hello?lang=en".parse().unwrap());
    /// assert_eq!(req.request_uri(), "/hello?lang=en");
    /// ```
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            remote_addr: SocketAddr::from((Ipv4Addr::new(192, 0, 2, 1), 1234)),
            version: Version::HTTP_11,
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
        }
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes, remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            version: parts.version,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
        }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }
    pub fn version(&self) -> Version { self.version }
    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header lookup. Values that are not visible ASCII are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The request target as sent on the request line: path plus query.
    ///
    /// Authority-form targets (`CONNECT host:port`) have no path and render
    /// as the authority.
    pub fn request_uri(&self) -> Cow<'_, str> {
        match self.uri.path_and_query() {
            Some(pq) => Cow::Borrowed(pq.as_str()),
            None => match self.uri.authority() {
                Some(authority) => Cow::Borrowed(authority.as_str()),
                None => Cow::Borrowed("/"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uri_keeps_the_query() {
        let req = Request::new(Method::GET, "/search?q=rust&page=2".parse().unwrap());
        assert_eq!(req.request_uri(), "/search?q=rust&page=2");
    }

    #[test]
    fn authority_form_renders_the_authority() {
        let req = Request::new(Method::CONNECT, "example.com:443".parse().unwrap());
        assert_eq!(req.request_uri(), "example.com:443");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut req = Request::new(Method::GET, "/".parse().unwrap());
        req.headers_mut().insert("x-request-id", "abc".parse().unwrap());
        assert_eq!(req.header("X-Request-Id"), Some("abc"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn body_defaults_to_empty_and_can_be_set() {
        let req = Request::new(Method::POST, "/echo".parse().unwrap());
        assert!(req.body().is_empty());

        let req = req.with_body("payload");
        assert_eq!(req.body(), b"payload");
    }
}
