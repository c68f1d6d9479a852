//! Error-to-response translation.
//!
//! A [`Wrapper`] owns the one [`ErrorHandler`] a router uses, and adapts
//! fallible handlers and middleware into the standard signatures by routing
//! their `Err` side through it. It is created once, cloned into every route
//! and sub-router, and shared read-only by all requests.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use crate::context::Context;
use crate::error::BoxError;
use crate::handler::{
    BoxFuture, BoxedFallibleHandler, BoxedHandler, ErasedHandler, Handler,
};
use crate::http_error::HttpError;
use crate::middleware::{
    BoxedFallibleMiddleware, BoxedMiddleware, ErasedMiddleware, Middleware, Next,
};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Turns an application error into the response for the request that
/// produced it.
///
/// Closures with the signature `Fn(BoxError, &Request) -> Response` are
/// accepted directly by [`Wrapper::new`]; implement this trait for
/// strategies that carry configuration.
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, err: BoxError, req: &Request) -> Response;
}

struct FnErrorHandler<F>(F);

impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: Fn(BoxError, &Request) -> Response + Send + Sync + 'static,
{
    fn handle(&self, err: BoxError, req: &Request) -> Response {
        (self.0)(err, req)
    }
}

/// The default strategy: `500 Internal Server Error` with the error's
/// `Display` output as a plain-text body.
pub fn default_error_handler(err: BoxError, _req: &Request) -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header("x-content-type-options", "nosniff")
        .text(err.to_string())
}

/// A strategy that understands [`HttpError`]: its status and JSON form are
/// used as-is. Any other error is answered with a generic 500 `HttpError`
/// so that internal detail never leaks.
pub fn json_error_handler(err: BoxError, _req: &Request) -> Response {
    match err.downcast::<HttpError>() {
        Ok(http) => (*http).into_response(),
        Err(other) => HttpError::new(500, "Internal Server Error")
            .with_boxed_internal_error(other)
            .into_response(),
    }
}

/// The error-handling strategy of a router.
#[derive(Clone)]
pub struct Wrapper {
    handler: Arc<dyn ErrorHandler>,
}

impl Wrapper {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(BoxError, &Request) -> Response + Send + Sync + 'static,
    {
        Self::from_handler(FnErrorHandler(handler))
    }

    pub fn from_handler(handler: impl ErrorHandler) -> Self {
        Self { handler: Arc::new(handler) }
    }

    /// Adapts a fallible handler: `Ok` responses pass through untouched,
    /// `Err` goes to [`handle_error`](Wrapper::handle_error) exactly once.
    pub fn adapt_handler(&self, handler: impl Handler) -> BoxedHandler {
        Arc::new(AdaptedHandler {
            inner: handler.into_boxed_fallible(),
            wrapper: self.clone(),
        })
    }

    /// Adapts a fallible middleware. On `Err` the chain stops here and the
    /// error handler answers; on `Ok(Some(ctx))` the request moves on with
    /// `ctx` attached; on `Ok(None)` it moves on unchanged.
    pub fn adapt_middleware(&self, middleware: impl Middleware) -> BoxedMiddleware {
        Arc::new(AdaptedMiddleware {
            inner: middleware.into_boxed_fallible(),
            wrapper: self.clone(),
        })
    }

    /// Produces the single response for `err`.
    pub fn handle_error(&self, err: BoxError, req: &Request) -> Response {
        debug!(error = %err, method = %req.method(), path = %req.path(), "handler failed");
        self.handler.handle(err, req)
    }
}

impl Default for Wrapper {
    fn default() -> Self {
        Self::new(default_error_handler)
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper").finish_non_exhaustive()
    }
}

// ── Adapters ──────────────────────────────────────────────────────────────────

struct AdaptedHandler {
    inner: BoxedFallibleHandler,
    wrapper: Wrapper,
}

impl ErasedHandler for AdaptedHandler {
    fn call(&self, req: Request) -> BoxFuture<Response> {
        let fut = self.inner.call(req.clone());
        let wrapper = self.wrapper.clone();
        Box::pin(async move {
            match fut.await {
                Ok(resp) => resp,
                Err(err) => wrapper.handle_error(err, &req),
            }
        })
    }
}

struct AdaptedMiddleware {
    inner: BoxedFallibleMiddleware,
    wrapper: Wrapper,
}

impl ErasedMiddleware for AdaptedMiddleware {
    fn call(&self, req: Request, next: Next) -> BoxFuture<Response> {
        let fut = self.inner.call(req.clone());
        let wrapper = self.wrapper.clone();
        Box::pin(async move {
            let context: Option<Context> = match fut.await {
                Ok(context) => context,
                Err(err) => return wrapper.handle_error(err, &req),
            };
            match context {
                Some(context) => next.run(req.with_context(context)).await,
                None => next.run(req).await,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;
    use crate::handler::RawHandler;

    #[derive(Debug, PartialEq)]
    struct UserId(u32);

    fn get() -> Request {
        http::Request::builder().uri("/items").body(Bytes::new()).unwrap().into()
    }

    fn counting(calls: Arc<AtomicUsize>, status: StatusCode) -> Wrapper {
        Wrapper::new(move |err: BoxError, _req: &Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            Response::builder().status(status).text(err.to_string())
        })
    }

    #[tokio::test]
    async fn default_strategy_is_plain_500() {
        let handler = Wrapper::default()
            .adapt_handler(|_req: Request| async { Err::<(), _>("boom") });
        let resp = handler.call(get()).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body(), b"boom");
        assert_eq!(resp.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[tokio::test]
    async fn ok_response_is_untouched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting(Arc::clone(&calls), StatusCode::BAD_REQUEST)
            .adapt_handler(|_req: Request| async {
                Ok::<_, BoxError>((StatusCode::ACCEPTED, "queued"))
            });
        let resp = handler.call(get()).await;

        assert_eq!(resp.status_code(), StatusCode::ACCEPTED);
        assert_eq!(resp.body(), b"queued");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn error_invokes_strategy_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting(Arc::clone(&calls), StatusCode::BAD_REQUEST)
            .adapt_handler(|_req: Request| async { Err::<(), _>("internal error occured") });
        let resp = handler.call(get()).await;

        assert_eq!(resp.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.body(), b"internal error occured");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_middleware_short_circuits() {
        let reached = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&reached);
        let endpoint = (move |_req: Request| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { "handler" }
        })
        .into_boxed_handler();

        let deny = Wrapper::default().adapt_middleware(|_req: Request| async {
            Err::<Option<Context>, _>("unauthorized")
        });
        let resp = Next::new(vec![deny], endpoint).run(get()).await;

        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body(), b"unauthorized");
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn middleware_context_reaches_next_stage() {
        let attach = Wrapper::default().adapt_middleware(|req: Request| async move {
            Ok::<_, BoxError>(Some(req.context().with_value(UserId(9))))
        });
        let endpoint = (|req: Request| async move {
            format!("{:?}", req.context().get::<UserId>())
        })
        .into_boxed_handler();

        let resp = Next::new(vec![attach], endpoint).run(get()).await;
        assert_eq!(resp.body(), b"Some(UserId(9))");
    }

    #[tokio::test]
    async fn middleware_without_context_forwards_request_unchanged() {
        let pass = Wrapper::default()
            .adapt_middleware(|_req: Request| async { Ok::<_, BoxError>(None) });
        let endpoint = (|req: Request| async move {
            format!("{} {}", req.path(), req.context().is_empty())
        })
        .into_boxed_handler();

        let resp = Next::new(vec![pass], endpoint).run(get()).await;
        assert_eq!(resp.body(), b"/items true");
    }

    #[tokio::test]
    async fn json_strategy_uses_http_error_status() {
        let wrapper = Wrapper::new(json_error_handler);

        let typed = wrapper.adapt_handler(|_req: Request| async {
            Err::<(), _>(HttpError::new(404, "Not Found").with_error_id("abc"))
        });
        let resp = typed.call(get()).await;
        assert_eq!(resp.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(resp.body(), br#"{"code":404,"message":"Not Found","id":"abc"}"#);

        let opaque = wrapper.adapt_handler(|_req: Request| async { Err::<(), _>("db down") });
        let resp = opaque.call(get()).await;
        assert_eq!(resp.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.body(), br#"{"code":500,"message":"Internal Server Error"}"#);
    }
}
