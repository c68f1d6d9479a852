//! # errmux
//!
//! Handlers that return errors, one place that turns errors into responses.
//!
//! A handler registered with [`Router::handle_func`] returns
//! `Result<impl IntoResponse, impl Into<BoxError>>`. On `Ok`, its value is
//! the response. On `Err`, the router's [`Wrapper`] hands the error to its
//! [`ErrorHandler`], which writes the response instead: by default a
//! plain-text `500` carrying the error message, or whatever policy you plug
//! in. [`HttpError`] carries a status code and a public / internal message
//! split for policies that want more than a 500, see
//! [`json_error_handler`].
//!
//! Middleware follows the same idea. A fallible middleware either fails,
//! which stops the chain and goes to the error handler, or returns an
//! optional new [`Context`] that the rest of the chain sees.
//!
//! Route matching is not done here: path and host templates are compiled
//! into [`matchit`] routers; a [`Router`] only walks its routes in order
//! and asks each one.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use errmux::{BoxError, Context, HttpError, Method, Request, Router, Server};
//!
//! #[derive(Clone)]
//! struct UserId(u64);
//!
//! #[tokio::main]
//! async fn main() -> Result<(), errmux::Error> {
//!     let mut app = Router::with_error_handler(errmux::json_error_handler);
//!     app.use_middleware(authenticate);
//!     app.handle_func("/users/{id}", get_user).methods(&[Method::GET]);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn authenticate(req: Request) -> Result<Option<Context>, HttpError> {
//!     match req.header("x-user") {
//!         Some(raw) => {
//!             let id = raw.parse().map_err(|_| HttpError::new(400, "Bad Request"))?;
//!             Ok(Some(req.context().with_value(UserId(id))))
//!         }
//!         None => Err(HttpError::new(401, "Unauthorized")),
//!     }
//! }
//!
//! async fn get_user(req: Request) -> Result<String, BoxError> {
//!     let caller = req.context().get::<UserId>().map_or(0, |u| u.0);
//!     let id = req.param("id").unwrap_or("unknown");
//!     Ok(format!("user {id}, requested by {caller}"))
//! }
//! ```

mod context;
mod error;
mod handler;
mod http_error;
mod request;
mod response;
mod route;
mod router;
mod server;
mod template;
mod wrapper;

pub mod middleware;

pub use context::Context;
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, BoxedHandler, Handler, RawHandler};
#[doc(hidden)]
pub use handler::ErasedHandler;
pub use http::{Method, StatusCode};
pub use http_error::HttpError;
pub use middleware::{BoxedMiddleware, Middleware, Next, RawMiddleware};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use route::Route;
pub use router::Router;
pub use server::Server;
pub use wrapper::{ErrorHandler, Wrapper, default_error_handler, json_error_handler};
