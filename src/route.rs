//! A single route: matchers, a handler, URL building.
//!
//! Every matcher narrows the set of requests the route accepts. Path and
//! host templates are compiled into [`matchit`] routers; the route only asks
//! them whether a request matches and copies out the captured variables.
//!
//! Setup mistakes (a malformed template, naming a route twice) do not panic.
//! The first one is kept on the route, reported by [`Route::error`], and the
//! route never matches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::{HeaderName, Method};
use matchit::Router as MatchitRouter;
use regex::Regex;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler, RawHandler};
use crate::middleware::BoxedMiddleware;
use crate::request::Request;
use crate::router::Router;
use crate::template::Template;
use crate::wrapper::Wrapper;

/// Catch-all parameter used to turn a prefix template into matchit routes.
const REST: &str = "__errmux_rest";

type MatcherFn = Arc<dyn Fn(&Request) -> bool + Send + Sync + 'static>;

type BuildVarsFn =
    Arc<dyn Fn(HashMap<String, String>) -> HashMap<String, String> + Send + Sync + 'static>;

/// What routes of a sub-router take over from the route owning it.
#[derive(Clone, Default)]
pub(crate) struct Inherited {
    pub(crate) prefix: String,
    pub(crate) host: Option<String>,
    pub(crate) schemes: Vec<String>,
    pub(crate) build_vars: Option<BuildVarsFn>,
}

/// What a successful match hands back to the router.
#[derive(Default)]
pub(crate) struct RouteMatch {
    pub(crate) handler: Option<BoxedHandler>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) middlewares: Vec<BoxedMiddleware>,
    pub(crate) method_mismatch: bool,
}

/// A route registered on a [`Router`].
///
/// Obtained from [`Router::new_route`], [`Router::handle_func`] and the
/// other registration methods. Every builder method returns `&mut Self`:
///
/// ```rust
/// use errmux::{Method, Request, Router, HttpError};
///
/// async fn show(req: Request) -> Result<String, HttpError> {
///     Ok(format!("article {}", req.param("id").unwrap_or_default()))
/// }
///
/// let mut app = Router::new();
/// app.handle_func("/articles/{id}", show)
///     .methods(&[Method::GET])
///     .host("{tenant}.example.com")
///     .name("article");
///
/// let url = app.get("article").unwrap()
///     .url(&[("tenant", "acme"), ("id", "42")])
///     .unwrap();
/// assert_eq!(url, "http://acme.example.com/articles/42");
/// ```
pub struct Route {
    wrapper: Wrapper,
    prefix: String,
    name: Option<String>,
    path: Option<PathMatcher>,
    host: Option<HostMatcher>,
    methods: Vec<Method>,
    headers: Vec<(HeaderName, String)>,
    headers_regexp: Vec<(HeaderName, Regex)>,
    queries: Vec<QueryMatcher>,
    schemes: Vec<String>,
    matchers: Vec<MatcherFn>,
    build_vars: Option<BuildVarsFn>,
    handler: Option<BoxedHandler>,
    subrouter: Option<Router>,
    build_only: bool,
    err: Option<Error>,
}

impl Route {
    pub(crate) fn new(wrapper: Wrapper, inherited: Inherited) -> Self {
        let mut route = Self {
            wrapper,
            prefix: inherited.prefix,
            name: None,
            path: None,
            host: None,
            methods: Vec::new(),
            headers: Vec::new(),
            headers_regexp: Vec::new(),
            queries: Vec::new(),
            schemes: inherited.schemes,
            matchers: Vec::new(),
            build_vars: inherited.build_vars,
            handler: None,
            subrouter: None,
            build_only: false,
            err: None,
        };
        if let Some(host) = inherited.host {
            route.host(&host);
        }
        route
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    /// Sets a fallible handler, adapted through the route's error handler.
    pub fn handler_func(&mut self, handler: impl Handler) -> &mut Self {
        self.handler = Some(self.wrapper.adapt_handler(handler));
        self
    }

    /// Sets a raw handler. Its response is sent as-is.
    pub fn handler(&mut self, handler: impl RawHandler) -> &mut Self {
        self.handler = Some(handler.into_boxed_handler());
        self
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn get_handler(&self) -> Option<&BoxedHandler> {
        self.handler.as_ref()
    }

    // ── Matchers ──────────────────────────────────────────────────────────────

    /// Matches the whole request path against `template`, prefixed by the
    /// path prefix of the router this route belongs to.
    pub fn path(&mut self, template: &str) -> &mut Self {
        let full = format!("{}{}", self.prefix, template);
        let compiled = PathMatcher::exact(&full);
        if let Some(matcher) = self.record(compiled) {
            self.path = Some(matcher);
        }
        self
    }

    /// Matches `template` and anything below it. Matching happens on
    /// segment boundaries: `/api` accepts `/api`, `/api/` and `/api/v1`,
    /// but not `/apiary`.
    pub fn path_prefix(&mut self, template: &str) -> &mut Self {
        let full = format!("{}{}", self.prefix, template);
        let compiled = PathMatcher::prefix(&full);
        if let Some(matcher) = self.record(compiled) {
            self.path = Some(matcher);
        }
        self
    }

    /// Matches the request host (without port) against `template`, where a
    /// variable spans one whole label: `{tenant}.example.com`.
    pub fn host(&mut self, template: &str) -> &mut Self {
        let compiled = HostMatcher::new(template);
        if let Some(matcher) = self.record(compiled) {
            self.host = Some(matcher);
        }
        self
    }

    pub fn methods(&mut self, methods: &[Method]) -> &mut Self {
        self.methods.extend_from_slice(methods);
        self
    }

    /// Requires each header to be present, and equal to the value unless the
    /// value is empty.
    pub fn headers(&mut self, pairs: &[(&str, &str)]) -> &mut Self {
        for (name, value) in pairs {
            if let Some(name) = self.record(header_name(name)) {
                self.headers.push((name, (*value).to_owned()));
            }
        }
        self
    }

    /// Like [`headers`](Route::headers), but each value is a regular
    /// expression searched for in the header value. An empty pattern only
    /// requires the header to be present.
    pub fn headers_regexp(&mut self, pairs: &[(&str, &str)]) -> &mut Self {
        for (name, pattern) in pairs {
            let parsed = header_name(name).and_then(|name| {
                let regex = Regex::new(pattern).map_err(|source| Error::Pattern {
                    pattern: (*pattern).to_owned(),
                    source,
                })?;
                Ok((name, regex))
            });
            if let Some(pair) = self.record(parsed) {
                self.headers_regexp.push(pair);
            }
        }
        self
    }

    /// Requires each query key to be present. A value of `{name}` captures
    /// the query value as route variable `name`; an empty value accepts any
    /// value; anything else must match exactly.
    pub fn queries(&mut self, pairs: &[(&str, &str)]) -> &mut Self {
        for (key, value) in pairs {
            let parsed = QueryMatcher::new(key, value);
            if let Some(matcher) = self.record(parsed) {
                self.queries.push(matcher);
            }
        }
        self
    }

    pub fn schemes(&mut self, schemes: &[&str]) -> &mut Self {
        self.schemes.extend(schemes.iter().map(|s| s.to_ascii_lowercase()));
        self
    }

    /// Adds a custom predicate over the request.
    pub fn matcher_fn<F>(&mut self, matcher: F) -> &mut Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.matchers.push(Arc::new(matcher));
        self
    }

    /// Rewrites the variables handed to [`url`](Route::url),
    /// [`url_host`](Route::url_host) and [`url_path`](Route::url_path)
    /// before the URL is built.
    pub fn build_vars_fn<F>(&mut self, rewrite: F) -> &mut Self
    where
        F: Fn(HashMap<String, String>) -> HashMap<String, String> + Send + Sync + 'static,
    {
        self.build_vars = Some(Arc::new(rewrite));
        self
    }

    /// The route is only used to build URLs; it never matches.
    pub fn build_only(&mut self) -> &mut Self {
        self.build_only = true;
        self
    }

    /// Names the route for [`Router::get`]. Naming a route twice is an error.
    pub fn name(&mut self, name: &str) -> &mut Self {
        if let Some(existing) = &self.name {
            let err = Error::DuplicateName(existing.clone());
            self.record::<()>(Err(err));
        } else {
            self.name = Some(name.to_owned());
        }
        self
    }

    /// Returns the sub-router of this route, creating it on first call.
    ///
    /// The sub-router shares this route's error handler, host template,
    /// schemes and build-vars function, and its routes' path templates are
    /// prefixed with this route's path template. Only what is set on this
    /// route before the first call is passed on.
    pub fn subrouter(&mut self) -> &mut Router {
        let inherited = Inherited {
            prefix: match &self.path {
                Some(path) => path.template.raw().to_owned(),
                None => self.prefix.clone(),
            },
            host: self.host_template().map(str::to_owned),
            schemes: self.schemes.clone(),
            build_vars: self.build_vars.clone(),
        };
        let wrapper = self.wrapper.clone();
        self.subrouter.get_or_insert_with(|| Router::nested(wrapper, inherited))
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// The first setup error recorded on this route.
    pub fn error(&self) -> Option<&Error> { self.err.as_ref() }
    pub fn get_name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn get_methods(&self) -> &[Method] { &self.methods }
    pub fn is_build_only(&self) -> bool { self.build_only }
    pub fn get_subrouter(&self) -> Option<&Router> { self.subrouter.as_ref() }

    pub fn path_template(&self) -> Option<&str> {
        self.path.as_ref().map(|p| p.template.raw())
    }

    pub fn host_template(&self) -> Option<&str> {
        self.host.as_ref().map(|h| h.template.raw())
    }

    /// Query matchers as `key=value` strings.
    pub fn queries_templates(&self) -> Vec<String> {
        self.queries.iter().map(|q| format!("{}={}", q.key, q.raw_value())).collect()
    }

    // ── URL building ──────────────────────────────────────────────────────────

    /// Builds the URL for this route from `pairs` of variable values.
    ///
    /// Absolute when the route has a host template (scheme from the first
    /// [`schemes`](Route::schemes) entry, else `http`), otherwise just the
    /// path. Query matchers contribute their key/value pairs.
    pub fn url(&self, pairs: &[(&str, &str)]) -> Result<String, Error> {
        self.usable()?;
        if self.path.is_none() && self.host.is_none() {
            return Err(Error::NoTemplate("path or host"));
        }

        let vars = self.vars_for(pairs);
        let path = match &self.path {
            Some(p) => p.template.expand(&vars)?,
            None => String::new(),
        };
        let query = self.build_query(&vars)?;

        match &self.host {
            Some(host) => {
                let scheme = self.schemes.first().map_or("http", String::as_str);
                let host = host.template.expand(&vars)?;
                let mut url = url::Url::parse(&format!("{scheme}://{host}"))?;
                url.set_path(&path);
                if !query.is_empty() {
                    url.set_query(Some(&query));
                }
                Ok(url.into())
            }
            None if query.is_empty() => Ok(path),
            None => Ok(format!("{path}?{query}")),
        }
    }

    pub fn url_host(&self, pairs: &[(&str, &str)]) -> Result<String, Error> {
        self.usable()?;
        let host = self.host.as_ref().ok_or(Error::NoTemplate("host"))?;
        host.template.expand(&self.vars_for(pairs))
    }

    pub fn url_path(&self, pairs: &[(&str, &str)]) -> Result<String, Error> {
        self.usable()?;
        let path = self.path.as_ref().ok_or(Error::NoTemplate("path"))?;
        path.template.expand(&self.vars_for(pairs))
    }

    fn vars_for(&self, pairs: &[(&str, &str)]) -> HashMap<String, String> {
        let vars = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        match &self.build_vars {
            Some(rewrite) => rewrite(vars),
            None => vars,
        }
    }

    fn build_query(&self, vars: &HashMap<String, String>) -> Result<String, Error> {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for matcher in &self.queries {
            match &matcher.value {
                QueryValue::Any => continue,
                QueryValue::Exact(value) => {
                    query.append_pair(&matcher.key, value);
                }
                QueryValue::Var(name) => {
                    let value =
                        vars.get(name).ok_or_else(|| Error::MissingVariable(name.clone()))?;
                    query.append_pair(&matcher.key, value);
                }
            }
        }
        Ok(query.finish())
    }

    // ── Matching ──────────────────────────────────────────────────────────────

    /// Tests the route against `req` without dispatching it. On a match,
    /// returns the variables captured by the host, path and query
    /// templates. A method mismatch is not a match.
    pub fn matches(&self, req: &Request) -> Option<HashMap<String, String>> {
        let mut m = RouteMatch::default();
        self.match_into(req, &mut m).then_some(m.params)
    }

    pub(crate) fn match_into(&self, req: &Request, m: &mut RouteMatch) -> bool {
        if self.build_only || self.err.is_some() {
            return false;
        }

        let mut params = HashMap::new();
        if let Some(host) = &self.host {
            if !host.matches(req, &mut params) {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if !path.matches(req.path(), &mut params) {
                return false;
            }
        }
        if !self.schemes.is_empty() && !self.schemes.iter().any(|s| s == req.scheme()) {
            return false;
        }
        if !self.headers.iter().all(|(name, value)| header_matches(req, name, value)) {
            return false;
        }
        if !self.headers_regexp.iter().all(|(name, regex)| header_matches_regex(req, name, regex)) {
            return false;
        }
        if !self.queries.iter().all(|q| q.matches(req, &mut params)) {
            return false;
        }
        if !self.matchers.iter().all(|matcher| matcher(req)) {
            return false;
        }
        if !self.methods.is_empty() && !self.methods.contains(req.method()) {
            m.method_mismatch = true;
            return false;
        }

        if let Some(subrouter) = &self.subrouter {
            let mut inner = RouteMatch::default();
            if !subrouter.match_request(req, &mut inner) {
                m.method_mismatch |= inner.method_mismatch;
                return false;
            }
            params.extend(inner.params);
            m.handler = inner.handler;
            m.middlewares = inner.middlewares;
            m.params = params;
            return true;
        }

        match &self.handler {
            Some(handler) => {
                m.handler = Some(Arc::clone(handler));
                m.params = params;
                true
            }
            None => false,
        }
    }

    /// Keeps the first setup error; later ones are usually consequences.
    fn record<T>(&mut self, result: Result<T, Error>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(error = %err, "route setup failed");
                self.err.get_or_insert(err);
                None
            }
        }
    }

    fn usable(&self) -> Result<(), Error> {
        match &self.err {
            Some(err) => Err(Error::Unusable(err.to_string())),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("path", &self.path_template())
            .field("host", &self.host_template())
            .field("methods", &self.methods)
            .field("has_handler", &self.handler.is_some())
            .field("error", &self.err)
            .finish_non_exhaustive()
    }
}

// ── Path ──────────────────────────────────────────────────────────────────────

struct PathMatcher {
    template: Template,
    forms: Vec<MatchitRouter<()>>,
}

impl PathMatcher {
    fn exact(raw: &str) -> Result<Self, Error> {
        Ok(Self { template: Template::parse(raw)?, forms: vec![compile(raw)?] })
    }

    fn prefix(raw: &str) -> Result<Self, Error> {
        let template = Template::parse(raw)?;
        if template.has_catch_all() {
            return Err(Error::Template {
                template: raw.to_owned(),
                reason: "a prefix already matches everything below it",
            });
        }

        let base = raw.trim_end_matches('/');
        let mut forms = Vec::with_capacity(3);
        if !base.is_empty() {
            forms.push(compile(base)?);
        }
        forms.push(compile(&format!("{base}/"))?);
        forms.push(compile(&format!("{base}/{{*{REST}}}"))?);

        Ok(Self { template, forms })
    }

    fn matches(&self, path: &str, params: &mut HashMap<String, String>) -> bool {
        for form in &self.forms {
            if let Ok(matched) = form.at(path) {
                params.extend(
                    matched.params.iter()
                        .filter(|(k, _)| *k != REST)
                        .map(|(k, v)| (k.to_owned(), v.to_owned())),
                );
                return true;
            }
        }
        false
    }
}

fn compile(template: &str) -> Result<MatchitRouter<()>, Error> {
    let mut router = MatchitRouter::new();
    router.insert(template, ()).map_err(|source| Error::Route {
        template: template.to_owned(),
        source,
    })?;
    Ok(router)
}

// ── Host ──────────────────────────────────────────────────────────────────────

/// Host templates are matched by matchit with labels as path segments:
/// `{tenant}.example.com` becomes `/{tenant}/example/com`.
struct HostMatcher {
    template: Template,
    form: MatchitRouter<()>,
}

impl HostMatcher {
    fn new(raw: &str) -> Result<Self, Error> {
        let invalid = |reason| Error::Template { template: raw.to_owned(), reason };

        if raw.is_empty() {
            return Err(invalid("empty host"));
        }
        if raw.contains(['/', ':']) {
            return Err(invalid("host templates name a host without port or path"));
        }

        let mut labels = Vec::new();
        for label in raw.split('.') {
            if label.contains(['{', '}']) {
                let whole =
                    label.starts_with('{') && label.ends_with('}') && !label.starts_with("{*");
                if !whole {
                    return Err(invalid("host variables must span a whole label"));
                }
                labels.push(label.to_owned());
            } else {
                labels.push(label.to_ascii_lowercase());
            }
        }

        let template = Template::parse(raw)?;
        let form = compile(&format!("/{}", labels.join("/")))?;
        Ok(Self { template, form })
    }

    fn matches(&self, req: &Request, params: &mut HashMap<String, String>) -> bool {
        let Some(host) = req.host() else { return false };
        let path = format!("/{}", host.to_ascii_lowercase().replace('.', "/"));
        match self.form.at(&path) {
            Ok(matched) => {
                params.extend(matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
                true
            }
            Err(_) => false,
        }
    }
}

// ── Headers and queries ───────────────────────────────────────────────────────

fn header_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::Template {
        template: name.to_owned(),
        reason: "invalid header name",
    })
}

fn header_matches_regex(req: &Request, name: &HeaderName, regex: &Regex) -> bool {
    req.headers().get_all(name).iter().any(|v| v.to_str().is_ok_and(|v| regex.is_match(v)))
}

fn header_matches(req: &Request, name: &HeaderName, value: &str) -> bool {
    let mut values = req.headers().get_all(name).iter().peekable();
    if value.is_empty() {
        return values.peek().is_some();
    }
    values.any(|v| v.to_str().is_ok_and(|v| v == value))
}

enum QueryValue {
    Any,
    Var(String),
    Exact(String),
}

struct QueryMatcher {
    key: String,
    value: QueryValue,
}

impl QueryMatcher {
    fn new(key: &str, value: &str) -> Result<Self, Error> {
        if key.is_empty() {
            return Err(Error::Template { template: value.to_owned(), reason: "empty query key" });
        }
        let value = if value.is_empty() {
            QueryValue::Any
        } else if let Some(name) = value.strip_prefix('{').and_then(|v| v.strip_suffix('}')) {
            if name.is_empty() || name.contains(['{', '}', '*']) {
                return Err(Error::Template {
                    template: value.to_owned(),
                    reason: "query variables look like `{name}`",
                });
            }
            QueryValue::Var(name.to_owned())
        } else {
            QueryValue::Exact(value.to_owned())
        };
        Ok(Self { key: key.to_owned(), value })
    }

    fn raw_value(&self) -> String {
        match &self.value {
            QueryValue::Any => String::new(),
            QueryValue::Var(name) => format!("{{{name}}}"),
            QueryValue::Exact(value) => value.clone(),
        }
    }

    fn matches(&self, req: &Request, params: &mut HashMap<String, String>) -> bool {
        let mut values = req.query_pairs().filter(|(k, _)| *k == self.key).map(|(_, v)| v);
        match &self.value {
            QueryValue::Any => values.next().is_some(),
            QueryValue::Exact(expected) => values.any(|v| v == *expected),
            QueryValue::Var(name) => match values.next() {
                Some(v) => {
                    params.insert(name.clone(), v);
                    true
                }
                None => false,
            },
        }
    }
}
