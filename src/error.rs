//! Unified error type.

/// A type-erased application error, as returned by fallible handlers and
/// middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by errmux's fallible setup operations.
///
/// Request-time failures are [`BoxError`]s and are turned into responses by
/// the [`Wrapper`](crate::Wrapper). This type surfaces everything that can go
/// wrong before a request is in flight: binding a port, compiling a route
/// template, building a URL.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid route `{template}`: {source}")]
    Route {
        template: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("invalid template `{template}`: {reason}")]
    Template { template: String, reason: &'static str },

    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("route has no {0} template")]
    NoTemplate(&'static str),

    #[error("route is unusable: {0}")]
    Unusable(String),

    #[error("route name `{0}` is already in use")]
    DuplicateName(String),

    #[error("missing route variable `{0}`")]
    MissingVariable(String),

    #[error("url: {0}")]
    Url(#[from] url::ParseError),
}
