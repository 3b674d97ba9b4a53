//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. The router is a
//! [`Handler`] like any other, so middleware wraps it as a whole.

use std::collections::HashMap;

use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{ResponseWriter, error};

/// The application router.
///
/// Build it once at startup; pass it (wrapped in middleware) to
/// [`Server::serve`](crate::Server::serve). Each registration returns `self`
/// so calls chain naturally.
///
/// A `HEAD` request with no `HEAD` route of its own is served by the `GET`
/// route. A path routed only for other methods answers
/// `405 Method Not Allowed` with an `Allow` header; anything else is
/// `404 page not found`.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use mlog::{Request, ResponseWriter, Router};
    /// # use http::Method;
    /// # fn get_user(_: &mut dyn ResponseWriter, _: &Request) {}
    /// # fn delete_user(_: &mut dyn ResponseWriter, _: &Request) {}
    /// Router::new()
    ///     .on(Method::DELETE, "/users/{id}", delete_user)
    ///     .on(Method::GET,    "/users/{id}", get_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, BoxedHandler::new(handler))
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&BoxedHandler, HashMap<String, String>)> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value, params))
    }

    /// Methods with a route matching `path`, sorted for a stable `Allow` header.
    fn allowed(&self, path: &str) -> Vec<&str> {
        let mut methods: Vec<&str> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.as_str())
            .collect();
        if methods.contains(&"GET") && !methods.contains(&"HEAD") {
            methods.push("HEAD");
        }
        methods.sort_unstable();
        methods
    }
}

impl Handler for Router {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request) {
        let path = req.uri().path();
        let found = self.lookup(req.method(), path).or_else(|| {
            (req.method() == Method::HEAD)
                .then(|| self.lookup(&Method::GET, path))
                .flatten()
        });

        match found {
            Some((handler, params)) if params.is_empty() => handler.serve(w, req),
            Some((handler, params)) => {
                let mut routed = req.clone();
                routed.params = params;
                handler.serve(w, &routed);
            }
            None => {
                let allowed = self.allowed(path);
                if allowed.is_empty() {
                    error(w, "404 page not found", StatusCode::NOT_FOUND);
                    return;
                }
                if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
                    w.headers_mut().insert(ALLOW, value);
                }
                error(w, "Method Not Allowed", StatusCode::METHOD_NOT_ALLOWED);
            }
        }
    }
}
