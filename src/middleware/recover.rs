//! Panic recovery middleware.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use http::StatusCode;
use http::header::{CONNECTION, HeaderValue};
use tracing::error;

use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{self, ResponseWriter};

/// Catches a panic in the inner handlers and answers `500` instead.
///
/// The response carries `Connection: close` and the body
/// `Internal Server Error: <panic message>`. If the handler had already
/// committed a status before panicking, that status stands and the error
/// text is appended to whatever body was written.
///
/// A panic raised while writing the error response itself is not caught.
///
/// The panic is logged once here, as an `error` event. The process panic
/// hook still runs before the unwind reaches this boundary, and the default
/// hook prints the message to stderr as well. Hosts that want only the
/// tracing event install their own hook with [`std::panic::set_hook`].
pub fn recover_panic(next: BoxedHandler) -> BoxedHandler {
    BoxedHandler::new(move |w: &mut dyn ResponseWriter, req: &Request| {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| next.serve(&mut *w, req)));
        if let Err(payload) = outcome {
            let message = panic_message(&*payload);
            error!(
                method = %req.method(),
                uri = %req.uri(),
                panic = %message,
                "handler panicked"
            );
            w.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
            response::error(
                w,
                &format!("Internal Server Error: {message}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            );
        }
    })
}

/// Renders a panic payload. `panic!` produces `&str` or `String`; anything
/// else came from `std::panic::panic_any`.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::middleware::{Chain, LogResponse, log_request};
    use crate::recorder::ResponseRecorder;

    fn get(path: &str) -> Request {
        Request::new(Method::GET, path.parse().unwrap())
    }

    fn boom(_w: &mut dyn ResponseWriter, _req: &Request) {
        panic!("boom");
    }

    fn missing_route(_w: &mut dyn ResponseWriter, req: &Request) {
        panic!("no route for {}", req.uri());
    }

    fn opaque_payload(_w: &mut dyn ResponseWriter, _req: &Request) {
        std::panic::panic_any(42_u32);
    }

    fn partial_then_panic(w: &mut dyn ResponseWriter, _req: &Request) {
        let _ = w.write_all(b"partial");
        panic!("late");
    }

    #[test]
    fn panic_becomes_500() {
        let handler = recover_panic(BoxedHandler::new(boom));

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, &get("/test"));

        assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(rec.body_str(), "Internal Server Error: boom");
        assert_eq!(rec.headers()[CONNECTION], "close");
    }

    #[test]
    fn formatted_panic_message_is_rendered() {
        let handler = recover_panic(BoxedHandler::new(missing_route));

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, &get("/missing"));

        assert_eq!(rec.body_str(), "Internal Server Error: no route for /missing");
    }

    #[test]
    fn non_string_payload_is_still_recovered() {
        let handler = recover_panic(BoxedHandler::new(opaque_payload));

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, &get("/"));

        assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(rec.body_str().contains("Internal Server Error"));
    }

    #[test]
    fn healthy_handler_is_untouched() {
        let handler = recover_panic(BoxedHandler::new(|w: &mut dyn ResponseWriter, _req: &Request| {
            w.write_header(StatusCode::ACCEPTED);
            let _ = w.write_all(b"queued");
        }));

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, &get("/jobs"));

        assert_eq!(rec.status(), StatusCode::ACCEPTED);
        assert_eq!(rec.body_str(), "queued");
        assert!(rec.headers().get(CONNECTION).is_none());
    }

    #[test]
    fn status_committed_before_panic_stands() {
        let handler = recover_panic(BoxedHandler::new(partial_then_panic));

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, &get("/"));

        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body_str(), "partialInternal Server Error: late");
    }

    #[test]
    fn handler_is_reusable_after_a_panic() {
        let handler = recover_panic(BoxedHandler::new(|w: &mut dyn ResponseWriter, req: &Request| {
            if req.uri().path() == "/panic" {
                panic!("boom");
            }
            let _ = w.write_all(b"fine");
        }));

        let mut first = ResponseRecorder::new();
        handler.serve(&mut first, &get("/panic"));
        assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let mut second = ResponseRecorder::new();
        handler.serve(&mut second, &get("/ok"));
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.body_str(), "fine");
    }

    #[test]
    fn full_stack_logs_the_recovered_500() {
        let statuses = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&statuses);
        let handler = Chain::new()
            .with(log_request)
            .with(LogResponse::with_log(move |entry: &crate::middleware::AccessEntry<'_>| {
                sink.lock().unwrap().push(entry.status);
            }))
            .with(recover_panic)
            .then(boom);

        let mut rec = ResponseRecorder::new();
        handler.serve(&mut rec, &get("/stack"));

        assert_eq!(rec.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*statuses.lock().unwrap(), [StatusCode::INTERNAL_SERVER_ERROR]);
    }
}
