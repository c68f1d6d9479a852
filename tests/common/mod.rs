//! Shared helpers for the integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use errmux::{
    BoxError, Context, Method, Middleware, Next, RawMiddleware, Request, Response, Router,
    StatusCode,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UserId(pub i64);

/// One middleware stage: attach a user id, or fail.
#[derive(Clone, Copy, Debug)]
pub enum Step {
    Set(i64),
    Fail(&'static str),
}

pub fn request(method: Method, uri: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "localhost")
        .body(Bytes::new())
        .unwrap()
        .into()
}

pub fn get(uri: &str) -> Request {
    request(Method::GET, uri)
}

/// Serves `req` in-process and returns status and body.
pub async fn send(router: &Router, req: Request) -> (StatusCode, String) {
    let resp = router.serve(req).await;
    (resp.status_code(), String::from_utf8_lossy(resp.body()).into_owned())
}

pub async fn ok_handler(_req: Request) -> Result<&'static str, BoxError> {
    Ok("OK")
}

pub async fn failed_handler(_req: Request) -> Result<(), BoxError> {
    Err("internal error occured".into())
}

/// Writes the user id the middleware chain attached.
pub async fn context_handler(req: Request) -> Result<String, BoxError> {
    let id = req.context().get::<UserId>().ok_or("wrong context key")?;
    if id.0 == 0 {
        return Err("empty context key".into());
    }
    Ok(id.0.to_string())
}

/// An error handler that answers every error with `code`.
pub fn error_handler(
    code: StatusCode,
) -> impl Fn(BoxError, &Request) -> Response + Send + Sync + 'static {
    move |err: BoxError, _req: &Request| Response::builder().status(code).text(err.to_string())
}

pub fn fallible(step: Step) -> impl Middleware {
    move |req: Request| async move {
        match step {
            Step::Set(id) => Ok(Some(req.context().with_value(UserId(id)))),
            Step::Fail(message) => Err(BoxError::from(message)),
        }
    }
}

pub fn raw(step: Step) -> impl RawMiddleware {
    move |req: Request, next: Next| async move {
        match step {
            Step::Set(id) => {
                let context: Context = req.context().with_value(UserId(id));
                next.run(req.with_context(context)).await
            }
            Step::Fail(message) => Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text(message),
        }
    }
}
