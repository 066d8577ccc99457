//! Handler results and their conversion into responses.
//!
//! # Responsibilities
//! - Define the closed set of values a handler may return
//! - Render structured errors as JSON `{name, message, details}`
//! - Wrap unstructured errors with their stack and log them
//! - Merge headers accumulated on the request into the final response
//!
//! # Design Decisions
//! - `Empty` means "continue with the next stage", never a response
//! - The handler's own headers are kept; request headers are appended
//! - Non-canonical status codes use the error message as reason phrase

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::ext::ReasonPhrase;
use serde_json::{json, Map, Value};

use crate::cookies::CookieError;

/// Status used when an unstructured error escapes a handler.
pub const DEFAULT_ERROR_STATUS: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

/// What a handler returns.
#[derive(Debug)]
pub enum HandlerOutput {
    /// Nothing to say; the pipeline moves on.
    Empty,
    /// A structured application error.
    Error(HttpError),
    /// Any other error.
    Raw(RawError),
    /// A complete response.
    Response(Response),
}

impl HandlerOutput {
    /// Wrap an arbitrary error.
    pub fn raw<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        HandlerOutput::Raw(RawError::new(error))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, HandlerOutput::Empty)
    }
}

impl From<HttpError> for HandlerOutput {
    fn from(error: HttpError) -> Self {
        HandlerOutput::Error(error)
    }
}

impl From<RawError> for HandlerOutput {
    fn from(error: RawError) -> Self {
        HandlerOutput::Raw(error)
    }
}

impl From<Response> for HandlerOutput {
    fn from(response: Response) -> Self {
        HandlerOutput::Response(response)
    }
}

impl From<Option<Response>> for HandlerOutput {
    fn from(response: Option<Response>) -> Self {
        response.map_or(HandlerOutput::Empty, HandlerOutput::Response)
    }
}

impl From<CookieError> for HandlerOutput {
    fn from(error: CookieError) -> Self {
        if error.is_programmer_error() {
            tracing::error!(kind = "programmer_error", error = %error, "Handler misused the cookie jar");
        }
        HandlerOutput::raw(error)
    }
}

/// A structured application error with an explicit status.
#[derive(Debug, Clone)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
    pub name: Option<String>,
    pub details: Option<Value>,
}

impl HttpError {
    /// Create an error whose message defaults to the canonical reason phrase.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            message: status.canonical_reason().unwrap_or_default().to_string(),
            name: None,
            details: None,
        }
    }

    /// Create an error with an explicit message.
    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::new(status)
        }
    }

    /// Create an error from a raw status code; invalid codes become 500.
    pub fn from_code(code: u16, message: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(code).unwrap_or(DEFAULT_ERROR_STATUS);
        Self::with_message(status, message)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The JSON body `{name, message, details}`.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "message": self.message,
            "details": self.details,
        })
    }

    /// Wrap an unstructured error under the default status, logging it.
    pub fn from_raw(error: &RawError) -> Self {
        tracing::error!(
            status = DEFAULT_ERROR_STATUS.as_u16(),
            error_name = %error.name(),
            error = %error,
            stack = %error.stack(),
            "Handler failed"
        );

        let mut details = Map::new();
        details.insert("stack".to_string(), Value::String(error.stack()));

        HttpError::with_message(DEFAULT_ERROR_STATUS, error.to_string())
            .with_name(error.name())
            .with_details(Value::Object(details))
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl StdError for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = self.to_json().to_string();
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        if self.status.canonical_reason().is_none() {
            if let Ok(reason) = ReasonPhrase::try_from(self.message.into_bytes()) {
                response.extensions_mut().insert(reason);
            }
        }
        response
    }
}

/// An unstructured error escaping a handler, with the stack at capture time.
pub struct RawError {
    source: Box<dyn StdError + Send + Sync>,
    name: String,
    backtrace: Backtrace,
}

impl RawError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            name: short_type_name::<E>(),
            source: Box::new(error),
            backtrace: Backtrace::force_capture(),
        }
    }

    /// Wrap a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            source: message.into(),
            name: "Error".to_string(),
            backtrace: Backtrace::force_capture(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stack(&self) -> String {
        let rendered = self.backtrace.to_string();
        if rendered.is_empty() {
            format!("{}: {}", self.name, self.source)
        } else {
            rendered
        }
    }

    pub fn source_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl fmt::Debug for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawError")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Turn a handler result into a response, or `None` to continue.
///
/// `request_headers` are the headers accumulated on the request (cookies
/// written during handling); they are appended to the response's own.
pub fn normalize(request_headers: &HeaderMap, output: HandlerOutput) -> Option<Response> {
    let mut response = match output {
        HandlerOutput::Empty => return None,
        HandlerOutput::Error(error) => error.into_response(),
        HandlerOutput::Raw(error) => HttpError::from_raw(&error).into_response(),
        HandlerOutput::Response(response) => response,
    };

    merge_headers(response.headers_mut(), request_headers);
    Some(response)
}

/// Append every request-scoped header onto the response headers.
pub fn merge_headers(target: &mut HeaderMap, extra: &HeaderMap) {
    for (name, value) in extra {
        target.append(name.clone(), value.clone());
    }
}

/// A plain-text response with the given status.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response
}

/// A JSON response with status 200.
pub fn json_response(value: &Value) -> Response {
    let mut response = Response::new(Body::from(value.to_string()));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom happened")
        }
    }

    impl StdError for Boom {}

    #[test]
    fn test_empty_continues() {
        assert!(normalize(&HeaderMap::new(), HandlerOutput::Empty).is_none());
    }

    #[tokio::test]
    async fn test_structured_error() {
        let error = HttpError::with_message(StatusCode::BAD_REQUEST, "Expecting data")
            .with_name("Validation")
            .with_details(json!({"field": "data"}));
        let response = normalize(&HeaderMap::new(), error.into()).unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"name": "Validation", "message": "Expecting data", "details": {"field": "data"}})
        );
    }

    #[test]
    fn test_default_message_is_reason_phrase() {
        assert_eq!(HttpError::new(StatusCode::NOT_FOUND).message, "Not Found");
    }

    #[test]
    fn test_custom_status_uses_message_as_reason() {
        let response = HttpError::from_code(599, "Odd Failure").into_response();
        assert_eq!(response.status().as_u16(), 599);
        let reason = response.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(reason.as_bytes(), b"Odd Failure");
    }

    #[tokio::test]
    async fn test_raw_error_has_message_and_stack() {
        let response = normalize(&HeaderMap::new(), HandlerOutput::raw(Boom)).unwrap();
        assert_eq!(response.status(), DEFAULT_ERROR_STATUS);

        let body = body_json(response).await;
        assert_eq!(body["message"], "boom happened");
        assert_eq!(body["name"], "Boom");
        assert!(!body["details"]["stack"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_headers_are_merged_not_replaced() {
        let mut request_headers = HeaderMap::new();
        request_headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        request_headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));

        let mut handler_response = text(StatusCode::OK, "ok");
        handler_response
            .headers_mut()
            .append(header::SET_COOKIE, HeaderValue::from_static("c=3"));
        handler_response
            .headers_mut()
            .insert("x-handler", HeaderValue::from_static("yes"));

        let response = normalize(&request_headers, handler_response.into()).unwrap();
        let cookies: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();

        assert_eq!(cookies, ["c=3", "a=1", "b=2"]);
        assert_eq!(response.headers()["x-handler"], "yes");
    }
}
