//! Handler traits and type erasure.
//!
//! Two kinds of handler can be registered:
//!
//! - a **fallible** [`Handler`] returns `Result<impl IntoResponse, E>`; the
//!   `Err` side goes to the router's [`Wrapper`](crate::Wrapper), which turns
//!   it into a response;
//! - a **raw** [`RawHandler`] returns `impl IntoResponse` and is registered
//!   as-is, bypassing the wrapper.
//!
//! Both end up as a [`BoxedHandler`], the one standard signature the router
//! dispatches to:
//!
//! ```text
//! async fn load(req: Request) -> Result<Response, HttpError>  ← user writes this
//!        ↓ router.handle_func("/", load)
//! load.into_boxed_fallible()                                 ← Handler blanket impl
//!        ↓
//! wrapper.adapt(…)                                           ← Err → ErrorHandler
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time                         ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::BoxError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` let tokio move the future across threads safely.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The standard handler signature: request in, response out, no error.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Response>;
}

/// A type-erased standard handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// The fallible signature, before the wrapper has adapted it.
#[doc(hidden)]
pub trait ErasedFallibleHandler {
    fn call(&self, req: Request) -> BoxFuture<Result<Response, BoxError>>;
}

#[doc(hidden)]
pub type BoxedFallibleHandler = Arc<dyn ErasedFallibleHandler + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every fallible route handler.
///
/// Automatically satisfied for any `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoResponse, impl Into<BoxError>>
/// ```
///
/// On `Ok` the value is the whole response; nothing is added to it. On `Err`
/// the router's error handler writes the response instead.
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_fallible(self) -> BoxedFallibleHandler;
}

/// Implemented for every raw route handler, the kind that is registered
/// without going through the error handler:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
pub trait RawHandler: private::SealedRawHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Sealing: only the blanket impls below satisfy the public traits.
mod private {
    pub trait SealedHandler {}
    pub trait SealedRawHandler {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R, E> private::SealedHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + 'static,
    E: Into<BoxError> + 'static,
{
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + 'static,
    E: Into<BoxError> + 'static,
{
    fn into_boxed_fallible(self) -> BoxedFallibleHandler {
        Arc::new(FallibleFn(self))
    }
}

impl<F, Fut, R> private::SealedRawHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
}

impl<F, Fut, R> RawHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(RawFn(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FallibleFn<F>(F);

impl<F, Fut, R, E> ErasedFallibleHandler for FallibleFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + 'static,
    E: Into<BoxError> + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Result<Response, BoxError>> {
        let fut = (self.0)(req);
        Box::pin(async move {
            fut.await
                .map(IntoResponse::into_response)
                .map_err(Into::into)
        })
    }
}

struct RawFn<F>(F);

impl<F, Fut, R> ErasedHandler for RawFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Response> {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::HttpError;

    fn get(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Bytes::new()).unwrap().into()
    }

    async fn ok(_req: Request) -> Result<&'static str, HttpError> {
        Ok("fine")
    }

    async fn fails(_req: Request) -> Result<Response, HttpError> {
        Err(HttpError::new(409, "Conflict"))
    }

    async fn raw(req: Request) -> String {
        req.path().to_owned()
    }

    #[tokio::test]
    async fn fallible_ok_passes_response_through() {
        let resp = ok.into_boxed_fallible().call(get("/")).await.unwrap();
        assert_eq!(resp.body(), b"fine");
    }

    #[tokio::test]
    async fn fallible_err_is_boxed() {
        let err = fails.into_boxed_fallible().call(get("/")).await.unwrap_err();
        let http = err.downcast_ref::<HttpError>().unwrap();
        assert_eq!(http.code(), 409);
    }

    #[tokio::test]
    async fn raw_handler_converts_output() {
        let resp = raw.into_boxed_handler().call(get("/echo")).await;
        assert_eq!(resp.status_code(), StatusCode::OK);
        assert_eq!(resp.body(), b"/echo");
    }
}
