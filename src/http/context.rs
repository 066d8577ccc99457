//! Per-request state handed to every handler.
//!
//! # Responsibilities
//! - Normalize the request path into segments and a pathname
//! - Hold path parameters bound by the route resolver
//! - Carry the side channel shared by middlewares, fallbacks and the controller
//! - Own the cookie jar and the headers accumulated for the response
//!
//! # Design Decisions
//! - Exactly one context per request, never shared or reused
//! - No locking: the context is exclusively owned by its request task

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{request::Parts, HeaderMap, Method, Request, Uri};

use crate::cookies::{CookieError, CookieJar, CookieOptions, CookieSigner, CookieValue};
use crate::http::request::X_REQUEST_ID;

type SideValue = Box<dyn Any + Send + Sync>;

/// The state of one inbound request as it moves through the pipeline.
pub struct RequestContext {
    parts: Parts,
    body: Option<Body>,
    segments: Vec<String>,
    pathname: String,
    params: HashMap<String, String>,
    data: HashMap<String, SideValue>,
    cookies: CookieJar,
    response_headers: HeaderMap,
}

impl RequestContext {
    pub fn new(request: Request<Body>, signer: Arc<CookieSigner>) -> Self {
        let (parts, body) = request.into_parts();
        let segments = split_segments(parts.uri.path());
        let pathname = format!("/{}", segments.join("/"));

        Self {
            parts,
            body: Some(body),
            segments,
            pathname,
            params: HashMap::new(),
            data: HashMap::new(),
            cookies: CookieJar::new(signer),
            response_headers: HeaderMap::new(),
        }
    }

    /// Decode and verify cookies. Idempotent.
    pub fn prepare(&mut self) {
        self.cookies.prepare(&self.parts.headers);
    }

    pub fn is_prepared(&self) -> bool {
        self.cookies.is_prepared()
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Non-empty path components, without a trailing empty segment.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// `/` followed by the segments joined with `/`.
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// First value of a query-string parameter.
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.parts.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn has_query(&self, name: &str) -> bool {
        self.query(name).is_some()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
    }

    /// Take the request body. Returns `None` once taken.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.params
    }

    /// Store a value for later stages of this request.
    pub fn insert_data<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Read a side-channel value if present and of type `T`.
    pub fn data<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.data.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Remove a side-channel value if present and of type `T`.
    pub fn take_data<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        if !self.data.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.data
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn contains_data(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Read a typed cookie. Fails if the context was never prepared.
    pub fn cookie<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CookieError> {
        self.cookies.get(name)
    }

    /// Queue a typed cookie on the response.
    pub fn set_cookie(
        &mut self,
        name: &str,
        value: impl Into<CookieValue>,
        options: &CookieOptions,
    ) -> Result<(), CookieError> {
        self.cookies
            .set(&mut self.response_headers, name, value, options)
    }

    /// Queue an already-encoded cookie payload on the response.
    pub fn set_raw_cookie(
        &mut self,
        name: &str,
        value: &str,
        options: &CookieOptions,
    ) -> Result<(), CookieError> {
        self.cookies
            .set_raw(&mut self.response_headers, name, value, options)
    }

    /// Headers merged into whichever response ends the pipeline.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.parts.method)
            .field("pathname", &self.pathname)
            .field("params", &self.params)
            .field("data_keys", &self.data.keys().collect::<Vec<_>>())
            .field("prepared", &self.is_prepared())
            .finish_non_exhaustive()
    }
}

/// Split a URL path, dropping the leading empty segment and a trailing one.
fn split_segments(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = path
        .strip_prefix('/')
        .unwrap_or(path)
        .split('/')
        .map(str::to_string)
        .collect();

    if segments.last().is_some_and(|last| last.is_empty()) {
        segments.pop();
    }
    segments
}
