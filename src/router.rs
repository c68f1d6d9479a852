//! The application router.
//!
//! An ordered list of [`Route`]s sharing one [`Wrapper`]. The first route
//! whose matchers all accept a request handles it. Build it once at
//! startup; pass it to [`Server::serve`](crate::Server::serve).

use std::fmt;

use http::StatusCode;

use crate::error::BoxError;
use crate::handler::{BoxedHandler, Handler, RawHandler};
use crate::middleware::{BoxedMiddleware, Middleware, Next, RawMiddleware};
use crate::request::Request;
use crate::response::Response;
use crate::route::{Inherited, Route, RouteMatch};
use crate::wrapper::Wrapper;

/// Routes requests to handlers that may fail, and turns their failures into
/// responses through one error handler.
///
/// ```rust
/// use errmux::{HttpError, Method, Request, Router};
///
/// async fn get_user(req: Request) -> Result<String, HttpError> {
///     match req.param("id") {
///         Some("0") => Err(HttpError::new(404, "Not Found")),
///         Some(id) => Ok(format!("user {id}")),
///         None => Err(HttpError::new(400, "Bad Request")),
///     }
/// }
///
/// let mut app = Router::with_error_handler(errmux::json_error_handler);
/// app.handle_func("/users/{id}", get_user).methods(&[Method::GET]);
/// ```
pub struct Router {
    wrapper: Wrapper,
    inherited: Inherited,
    routes: Vec<Route>,
    middlewares: Vec<BoxedMiddleware>,
    not_found: Option<BoxedHandler>,
    method_not_allowed: Option<BoxedHandler>,
}

impl Router {
    /// A router using the default error handler (plain-text 500).
    pub fn new() -> Self {
        Self::with_wrapper(Wrapper::default())
    }

    pub fn with_wrapper(wrapper: Wrapper) -> Self {
        Self::nested(wrapper, Inherited::default())
    }

    pub fn with_error_handler<F>(handler: F) -> Self
    where
        F: Fn(BoxError, &Request) -> Response + Send + Sync + 'static,
    {
        Self::with_wrapper(Wrapper::new(handler))
    }

    pub(crate) fn nested(wrapper: Wrapper, inherited: Inherited) -> Self {
        Self {
            wrapper,
            inherited,
            routes: Vec::new(),
            middlewares: Vec::new(),
            not_found: None,
            method_not_allowed: None,
        }
    }

    pub fn wrapper(&self) -> &Wrapper {
        &self.wrapper
    }

    /// Replaces the error handler for everything registered from now on.
    /// Handlers and middleware already registered keep the one they were
    /// adapted with.
    pub fn set_wrapper(&mut self, wrapper: Wrapper) -> &mut Self {
        self.wrapper = wrapper;
        self
    }

    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(BoxError, &Request) -> Response + Send + Sync + 'static,
    {
        self.set_wrapper(Wrapper::new(handler))
    }

    // ── Registration ──────────────────────────────────────────────────────────

    /// Registers a fallible handler for a path template.
    pub fn handle_func(&mut self, path: &str, handler: impl Handler) -> &mut Route {
        self.new_route().path(path).handler_func(handler)
    }

    /// Registers a raw handler for a path template, bypassing the error
    /// handler.
    pub fn handle(&mut self, path: &str, handler: impl RawHandler) -> &mut Route {
        self.new_route().path(path).handler(handler)
    }

    /// Appends a fallible middleware, adapted through the error handler.
    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        let adapted = self.wrapper.adapt_middleware(middleware);
        self.middlewares.push(adapted);
        self
    }

    /// Appends a raw middleware as-is.
    pub fn use_bypass(&mut self, middleware: impl RawMiddleware) -> &mut Self {
        self.middlewares.push(middleware.into_boxed_middleware());
        self
    }

    /// Answers requests no route matched. Defaults to an empty 404.
    pub fn not_found_handler(&mut self, handler: impl Handler) -> &mut Self {
        self.not_found = Some(self.wrapper.adapt_handler(handler));
        self
    }

    /// Answers requests whose path matched a route but whose method did not.
    /// Defaults to an empty 405.
    pub fn method_not_allowed_handler(&mut self, handler: impl Handler) -> &mut Self {
        self.method_not_allowed = Some(self.wrapper.adapt_handler(handler));
        self
    }

    /// Appends an empty route sharing this router's error handler, and the
    /// path prefix, host and schemes of the route owning this router.
    pub fn new_route(&mut self) -> &mut Route {
        self.routes.push(Route::new(self.wrapper.clone(), self.inherited.clone()));
        let last = self.routes.len() - 1;
        &mut self.routes[last]
    }

    pub fn path(&mut self, template: &str) -> &mut Route {
        self.new_route().path(template)
    }

    pub fn path_prefix(&mut self, template: &str) -> &mut Route {
        self.new_route().path_prefix(template)
    }

    pub fn host(&mut self, template: &str) -> &mut Route {
        self.new_route().host(template)
    }

    pub fn methods(&mut self, methods: &[http::Method]) -> &mut Route {
        self.new_route().methods(methods)
    }

    pub fn headers(&mut self, pairs: &[(&str, &str)]) -> &mut Route {
        self.new_route().headers(pairs)
    }

    pub fn queries(&mut self, pairs: &[(&str, &str)]) -> &mut Route {
        self.new_route().queries(pairs)
    }

    pub fn schemes(&mut self, schemes: &[&str]) -> &mut Route {
        self.new_route().schemes(schemes)
    }

    pub fn matcher_fn<F>(&mut self, matcher: F) -> &mut Route
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.new_route().matcher_fn(matcher)
    }

    pub fn name(&mut self, name: &str) -> &mut Route {
        self.new_route().name(name)
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    /// Finds a named route, searching sub-routers depth-first.
    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find_map(|route| {
            if route.get_name() == Some(name) {
                Some(route)
            } else {
                route.get_subrouter().and_then(|sub| sub.get(name))
            }
        })
    }

    /// Visits every route in registration order, descending into
    /// sub-routers right after the route that owns them. The visitor also
    /// receives the chain of routes leading to the current one. The first
    /// error stops the walk.
    pub fn walk<F, E>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&Route, &[&Route]) -> Result<(), E>,
    {
        let mut ancestors = Vec::new();
        self.walk_routes(&mut visit, &mut ancestors)
    }

    fn walk_routes<'a, F, E>(
        &'a self,
        visit: &mut F,
        ancestors: &mut Vec<&'a Route>,
    ) -> Result<(), E>
    where
        F: FnMut(&Route, &[&Route]) -> Result<(), E>,
    {
        for route in &self.routes {
            visit(route, ancestors.as_slice())?;
            if let Some(sub) = route.get_subrouter() {
                ancestors.push(route);
                sub.walk_routes(visit, ancestors)?;
                ancestors.pop();
            }
        }
        Ok(())
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    pub(crate) fn match_request(&self, req: &Request, m: &mut RouteMatch) -> bool {
        for route in &self.routes {
            if route.match_into(req, m) {
                // Our middleware runs before anything a sub-router added.
                if !self.middlewares.is_empty() {
                    let mut chain = self.middlewares.clone();
                    chain.append(&mut m.middlewares);
                    m.middlewares = chain;
                }
                return true;
            }
        }
        false
    }

    /// Routes one request and produces one response.
    pub async fn serve(&self, req: Request) -> Response {
        let mut m = RouteMatch::default();
        if self.match_request(&req, &mut m) {
            if let Some(handler) = m.handler {
                let req = req.with_params(m.params);
                return Next::new(m.middlewares, handler).run(req).await;
            }
        }

        let (fallback, status) = if m.method_mismatch {
            (&self.method_not_allowed, StatusCode::METHOD_NOT_ALLOWED)
        } else {
            (&self.not_found, StatusCode::NOT_FOUND)
        };
        match fallback {
            Some(handler) => handler.call(req).await,
            None => Response::status(status),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.inherited.prefix)
            .field("routes", &self.routes)
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}
