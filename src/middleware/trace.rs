//! Per-request tracing span.

use std::time::Instant;

use tracing::{Instrument, info, info_span};

use super::Next;
use crate::request::Request;
use crate::response::Response;

/// Raw middleware that wraps the rest of the chain in an `info` span
/// carrying the method and path, and logs status and latency on the way out.
///
/// ```rust,no_run
/// use errmux::{Router, middleware};
///
/// let mut app = Router::new();
/// app.use_bypass(middleware::trace);
/// ```
pub async fn trace(req: Request, next: Next) -> Response {
    let span = info_span!("request", method = %req.method(), path = %req.path());
    let started = Instant::now();

    let resp = next.run(req).instrument(span.clone()).await;

    info!(
        parent: &span,
        status = resp.status_code().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    resp
}
