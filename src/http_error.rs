//! Structured HTTP error with a public / internal message split.
//!
//! Wire format (camelCase, internal fields only when disclosure is on):
//!
//! ```text
//! {"code":400,"message":"Bad Request"}
//! {"code":500,"message":"Server Error","internalError":"...","internalMessage":"...","id":"123"}
//! ```

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BoxError;
use crate::response::{IntoResponse, Response};

type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// An HTTP-facing error.
///
/// `message` is always public. `internal_message` and `internal_error` are
/// serialized only when [`show_internal`](HttpError::show_internal) is set.
///
/// ```rust
/// use errmux::HttpError;
///
/// let err = HttpError::new(401, "Unauthorized")
///     .with_internal_message("token expired")
///     .with_error_id("456");
///
/// assert_eq!(err.to_string(), "token expired");
/// assert_eq!(
///     serde_json::to_string(&err).unwrap(),
///     r#"{"code":401,"message":"Unauthorized","id":"456"}"#,
/// );
/// ```
#[derive(Clone)]
pub struct HttpError {
    code: u16,
    message: String,
    internal_error: Option<Cause>,
    internal_message: String,
    error_id: String,
    show_internal: bool,
}

impl HttpError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            internal_error: None,
            internal_message: String::new(),
            error_id: String::new(),
            show_internal: false,
        }
    }

    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = message.into();
        self
    }

    pub fn with_internal_error<E>(mut self, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.internal_error = Some(Arc::new(err));
        self
    }

    /// Like [`with_internal_error`](HttpError::with_internal_error), for an
    /// error that is already boxed (e.g. one returned by a handler).
    pub fn with_boxed_internal_error(mut self, err: BoxError) -> Self {
        self.internal_error = Some(Arc::from(err));
        self
    }

    pub fn with_error_id(mut self, id: impl Into<String>) -> Self {
        self.error_id = id.into();
        self
    }

    pub fn with_show_internal(mut self, flag: bool) -> Self {
        self.show_internal = flag;
        self
    }

    pub fn code(&self) -> u16 { self.code }

    /// The status code as a typed value. Codes outside `100..=999` map to 500.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn message(&self) -> &str { &self.message }
    pub fn internal_message(&self) -> &str { &self.internal_message }
    pub fn error_id(&self) -> &str { &self.error_id }
    pub fn show_internal(&self) -> bool { self.show_internal }

    pub fn internal_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.internal_error.as_deref()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.internal_message.is_empty() {
            f.write_str(&self.message)
        } else {
            f.write_str(&self.internal_message)
        }
    }
}

impl fmt::Debug for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("internal_error", &self.internal_error.as_ref().map(|e| e.to_string()))
            .field("internal_message", &self.internal_message)
            .field("error_id", &self.error_id)
            .field("show_internal", &self.show_internal)
            .finish()
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.internal_error
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Answers with the error's own status and its JSON form as the body.
impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        match serde_json::to_vec(&self) {
            Ok(body) => Response::builder().status(status).json(body),
            Err(_) => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}

// ── Wire form ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireOut<'a> {
    code: u16,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    internal_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    internal_message: Option<&'a str>,
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    error_id: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireIn {
    code: u16,
    message: String,
    #[serde(default)]
    internal_error: String,
    #[serde(default)]
    internal_message: String,
    #[serde(rename = "id", default)]
    error_id: String,
}

impl Serialize for HttpError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (internal_error, internal_message) = if self.show_internal {
            (
                self.internal_error.as_ref().map(|e| e.to_string()),
                Some(self.internal_message.as_str()).filter(|m| !m.is_empty()),
            )
        } else {
            (None, None)
        };

        WireOut {
            code: self.code,
            message: &self.message,
            internal_error,
            internal_message,
            error_id: Some(self.error_id.as_str()).filter(|id| !id.is_empty()),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for HttpError {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireIn::deserialize(deserializer)?;

        // A disclosed cause means disclosure was on; a bare internal message
        // does not turn it on by itself.
        let show_internal = !wire.internal_error.is_empty();
        let internal_error =
            show_internal.then(|| Arc::new(Disclosed(wire.internal_error)) as Cause);

        Ok(Self {
            code: wire.code,
            message: wire.message,
            internal_error,
            internal_message: wire.internal_message,
            error_id: wire.error_id,
            show_internal,
        })
    }
}

/// A cause rebuilt from its disclosed string form.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Disclosed(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("Unexpected Error")]
    struct Unexpected;

    #[test]
    fn public_only_by_default() {
        let err = HttpError::new(400, "Bad Request");
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"code":400,"message":"Bad Request"}"#,
        );
    }

    #[test]
    fn discloses_internal_detail_when_asked() {
        let err = HttpError::new(500, "Server Error")
            .with_show_internal(true)
            .with_internal_error(Unexpected)
            .with_internal_message("Failed")
            .with_error_id("123");
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            concat!(
                r#"{"code":500,"message":"Server Error","internalError":"Unexpected Error","#,
                r#""internalMessage":"Failed","id":"123"}"#,
            ),
        );
    }

    #[test]
    fn hides_internal_detail_without_disclosure() {
        let err = HttpError::new(500, "Server Error")
            .with_internal_error(Unexpected)
            .with_internal_message("Failed")
            .with_error_id("123");
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"code":500,"message":"Server Error","id":"123"}"#,
        );
    }

    #[test]
    fn display_prefers_internal_message() {
        let err = HttpError::new(401, "Unauthorized");
        assert_eq!(err.to_string(), "Unauthorized");
        assert_eq!(err.with_internal_message("bad token").to_string(), "bad token");
    }

    #[test]
    fn decode_without_internal_detail() {
        let json = serde_json::to_vec(&HttpError::new(404, "Not Found")).unwrap();
        let err: HttpError = serde_json::from_slice(&json).unwrap();
        assert_eq!(err.code(), 404);
        assert_eq!(err.message(), "Not Found");
        assert!(err.internal_error().is_none());
        assert!(err.internal_message().is_empty());
        assert!(!err.show_internal());
    }

    #[test]
    fn decode_rebuilds_cause_and_disclosure() {
        let original = HttpError::new(500, "Server Error")
            .with_internal_error(Unexpected)
            .with_show_internal(true);
        let json = serde_json::to_vec(&original).unwrap();
        let err: HttpError = serde_json::from_slice(&json).unwrap();

        assert!(err.show_internal());
        let cause = err.internal_error().unwrap();
        assert_eq!(cause.to_string(), Unexpected.to_string());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn decode_internal_message_alone_keeps_disclosure_off() {
        let json = r#"{"code":500,"message":"x","internalMessage":"m"}"#;
        let err: HttpError = serde_json::from_str(json).unwrap();
        assert_eq!(err.internal_message(), "m");
        assert!(err.internal_error().is_none());
        assert!(!err.show_internal());
    }

    #[test]
    fn source_is_the_cause() {
        let err = HttpError::new(502, "Bad Gateway").with_internal_error(Unexpected);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Unexpected Error");
    }

    #[test]
    fn out_of_range_code_maps_to_500() {
        assert_eq!(HttpError::new(42, "odd").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(HttpError::new(418, "teapot").status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn into_response_uses_code_and_json() {
        let resp = HttpError::new(403, "Forbidden").into_response();
        assert_eq!(resp.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(resp.body(), br#"{"code":403,"message":"Forbidden"}"#);
        assert_eq!(resp.header("content-type"), Some("application/json"));
    }
}
