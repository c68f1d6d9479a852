//! Minimal errmux example: handlers that return errors, one JSON error
//! policy, an auth middleware that attaches the caller to the context.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/users/42 -H 'x-user: 7'
//!   curl -i http://localhost:3000/users/0  -H 'x-user: 7'
//!   curl -i http://localhost:3000/users/42
//!   curl -i -X POST http://localhost:3000/users -H 'x-user: 7' -d '{"name":"alice"}'

use errmux::{
    Context, HttpError, Method, Request, Response, Router, Server, StatusCode, middleware,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy)]
struct Caller(u64);

#[derive(Serialize)]
struct User {
    id: String,
    name: String,
    requested_by: u64,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), errmux::Error> {
    tracing_subscriber::fmt::init();

    let mut app = Router::with_error_handler(errmux::json_error_handler);
    app.use_bypass(middleware::trace);

    let users = app.path_prefix("/users").subrouter();
    users.use_middleware(authenticate);
    users.handle_func("/{id}", get_user).methods(&[Method::GET]).name("user");
    users.handle_func("", create_user).methods(&[Method::POST]);

    app.handle("/healthz", |_req: Request| async { "ok" });

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// Every /users route needs a caller.
async fn authenticate(req: Request) -> Result<Option<Context>, HttpError> {
    let raw = req.header("x-user").ok_or_else(|| HttpError::new(401, "Unauthorized"))?;
    let id = raw.parse().map_err(|e| {
        HttpError::new(400, "Bad Request")
            .with_internal_error(e)
            .with_internal_message("x-user is not a number")
    })?;
    Ok(Some(req.context().with_value(Caller(id))))
}

// GET /users/{id}
async fn get_user(req: Request) -> Result<Response, HttpError> {
    let caller = req.context().get::<Caller>().map_or(0, |c| c.0);
    let id = req.param("id").unwrap_or_default();
    if id == "0" {
        return Err(HttpError::new(404, "Not Found").with_error_id(format!("user-{id}")));
    }

    let user = User { id: id.to_owned(), name: "alice".to_owned(), requested_by: caller };
    let body = serde_json::to_vec(&user)
        .map_err(|e| HttpError::new(500, "Server Error").with_internal_error(e))?;
    Ok(Response::json(body))
}

// POST /users
async fn create_user(req: Request) -> Result<Response, HttpError> {
    let input: NewUser = serde_json::from_slice(req.body())
        .map_err(|e| HttpError::new(422, "Unprocessable Entity").with_internal_error(e))?;

    let body = serde_json::to_vec(&User { id: "99".to_owned(), name: input.name, requested_by: 0 })
        .map_err(|e| HttpError::new(500, "Server Error").with_internal_error(e))?;
    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(body))
}
