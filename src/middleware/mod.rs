//! Middleware layer.
//!
//! Two kinds of middleware can be installed on a [`Router`](crate::Router):
//!
//! - a **fallible** [`Middleware`] looks at the request and either fails,
//!   which ends the chain with the error handler's response, or succeeds
//!   with an optional new [`Context`] for the stages after it:
//!
//!   ```text
//!   async fn name(req: Request) -> Result<Option<Context>, impl Into<BoxError>>
//!   ```
//!
//! - a **raw** [`RawMiddleware`] receives the request and the rest of the
//!   chain as [`Next`], and is installed as-is:
//!
//!   ```text
//!   async fn name(req: Request, next: Next) -> impl IntoResponse
//!   ```
//!
//! Both become a [`BoxedMiddleware`]. Middleware only runs for requests that
//! matched a route; the not-found and method-not-allowed fallbacks are
//! answered directly.
//!
//! Built-in middleware:
//! - [`trace`] — per-request span with method, path, status, latency

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::BoxError;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

mod trace;

pub use trace::trace;

// ── Internal types ────────────────────────────────────────────────────────────

/// The standard middleware signature.
#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, req: Request, next: Next) -> BoxFuture<Response>;
}

/// A type-erased standard middleware shared across concurrent requests.
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

/// The fallible signature, before the wrapper has adapted it.
#[doc(hidden)]
pub trait ErasedFallibleMiddleware {
    fn call(&self, req: Request) -> BoxFuture<Result<Option<Context>, BoxError>>;
}

#[doc(hidden)]
pub type BoxedFallibleMiddleware = Arc<dyn ErasedFallibleMiddleware + Send + Sync + 'static>;

// ── Next ─────────────────────────────────────────────────────────────────────

/// The remainder of a middleware chain, ending in the route's handler.
pub struct Next {
    chain: Arc<[BoxedMiddleware]>,
    position: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(chain: Vec<BoxedMiddleware>, endpoint: BoxedHandler) -> Self {
        Self { chain: chain.into(), position: 0, endpoint }
    }

    /// Runs the next middleware, or the handler once the chain is exhausted.
    pub fn run(self, req: Request) -> BoxFuture<Response> {
        match self.chain.get(self.position) {
            Some(middleware) => {
                let middleware = Arc::clone(middleware);
                let rest = Self {
                    chain: self.chain,
                    position: self.position + 1,
                    endpoint: self.endpoint,
                };
                middleware.call(req, rest)
            }
            None => self.endpoint.call(req),
        }
    }
}

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every fallible middleware.
///
/// Returning `Ok(Some(ctx))` forwards the request with `ctx` as its context;
/// build it from `req.context().with_value(…)` to keep what earlier stages
/// attached. `Ok(None)` forwards the request unchanged. `Err` stops the
/// chain: neither later middleware nor the handler runs.
pub trait Middleware: private::SealedMiddleware + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_fallible(self) -> BoxedFallibleMiddleware;
}

/// Implemented for every raw middleware.
pub trait RawMiddleware: private::SealedRawMiddleware + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_middleware(self) -> BoxedMiddleware;
}

mod private {
    pub trait SealedMiddleware {}
    pub trait SealedRawMiddleware {}
}

impl<F, Fut, E> private::SealedMiddleware for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Context>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
}

impl<F, Fut, E> Middleware for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Context>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn into_boxed_fallible(self) -> BoxedFallibleMiddleware {
        Arc::new(FallibleFn(self))
    }
}

impl<F, Fut, R> private::SealedRawMiddleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
}

impl<F, Fut, R> RawMiddleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
    fn into_boxed_middleware(self) -> BoxedMiddleware {
        Arc::new(RawFn(self))
    }
}

struct FallibleFn<F>(F);

impl<F, Fut, E> ErasedFallibleMiddleware for FallibleFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<Context>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Result<Option<Context>, BoxError>> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

struct RawFn<F>(F);

impl<F, Fut, R> ErasedMiddleware for RawFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture<Response> {
        let fut = (self.0)(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::handler::RawHandler;

    fn get() -> Request {
        http::Request::builder().uri("/").body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn empty_chain_runs_endpoint() {
        let endpoint = (|_req: Request| async { "end" }).into_boxed_handler();
        let resp = Next::new(Vec::new(), endpoint).run(get()).await;
        assert_eq!(resp.body(), b"end");
    }

    #[tokio::test]
    async fn raw_middleware_runs_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let tag = |name: &'static str, seen: Arc<Mutex<Vec<&'static str>>>| {
            (move |req: Request, next: Next| {
                seen.lock().unwrap().push(name);
                next.run(req)
            })
            .into_boxed_middleware()
        };

        let chain = vec![tag("a", Arc::clone(&seen)), tag("b", Arc::clone(&seen))];
        let endpoint = (|_req: Request| async { StatusCode::NO_CONTENT }).into_boxed_handler();
        let resp = Next::new(chain, endpoint).run(get()).await;

        assert_eq!(resp.status_code(), StatusCode::NO_CONTENT);
        assert_eq!(*seen.lock().unwrap(), ["a", "b"]);
    }

    #[tokio::test]
    async fn raw_middleware_can_answer_early() {
        let deny = (|_req: Request, _next: Next| async { StatusCode::FORBIDDEN })
            .into_boxed_middleware();
        let endpoint = (|_req: Request| async { "unreachable" }).into_boxed_handler();
        let resp = Next::new(vec![deny], endpoint).run(get()).await;
        assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
        assert!(resp.body().is_empty());
    }
}
