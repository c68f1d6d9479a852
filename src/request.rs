//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};

use crate::context::Context;

/// An incoming HTTP request with its body already collected.
///
/// Cloning is cheap: the head and the route parameters are shared, the body
/// is a reference-counted [`Bytes`], and the [`Context`] is an `Arc` chain.
/// Middleware gets its own clone, so it can never change the request the
/// rest of the chain sees except by returning a new [`Context`].
#[derive(Clone, Debug)]
pub struct Request {
    head: Arc<Parts>,
    body: Bytes,
    params: Arc<HashMap<String, String>>,
    context: Context,
}

impl Request {
    pub(crate) fn new(head: Parts, body: Bytes) -> Self {
        Self {
            head: Arc::new(head),
            body,
            params: Arc::default(),
            context: Context::new(),
        }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn query(&self) -> Option<&str> { self.head.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn context(&self) -> &Context { &self.context }

    /// Case-insensitive header lookup. Non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a decoded query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub(crate) fn query_pairs(&self) -> impl Iterator<Item = (String, String)> + '_ {
        url::form_urlencoded::parse(self.query().unwrap_or("").as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
    }

    /// Host the request was sent to, without the port. Taken from the
    /// absolute URI when present, otherwise from the `Host` header.
    pub fn host(&self) -> Option<&str> {
        let raw = self.head.uri.host().or_else(|| self.header("host"))?;
        Some(strip_port(raw))
    }

    /// `https` or `http`, from the absolute URI; `http` when the URI is
    /// origin-form.
    pub fn scheme(&self) -> &str {
        self.head.uri.scheme_str().unwrap_or("http")
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Returns this request carrying `context` instead of its current one.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub(crate) fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = Arc::new(params);
        self
    }
}

impl<B: Into<Bytes>> From<http::Request<B>> for Request {
    fn from(req: http::Request<B>) -> Self {
        let (head, body) = req.into_parts();
        Self::new(head, body.into())
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(end) = host.strip_prefix('[').and_then(|rest| rest.find(']')) {
        return &host[..end + 2];
    }
    host.split(':').next().unwrap_or(host)
}
