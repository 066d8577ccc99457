//! Per-request cookie jar.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde::de::DeserializeOwned;

use crate::cookies::{codec, CookieError, CookieOptions, CookieSigner, CookieValue};

/// Lazily decoded view of the request's cookies.
///
/// The jar starts unprepared; [`CookieJar::prepare`] decodes and verifies
/// the incoming `Cookie` headers once. Reads before that fail with
/// [`CookieError::NotPrepared`].
#[derive(Debug)]
pub struct CookieJar {
    signer: Arc<CookieSigner>,
    decoded: Option<HashMap<String, String>>,
}

impl CookieJar {
    pub fn new(signer: Arc<CookieSigner>) -> Self {
        Self {
            signer,
            decoded: None,
        }
    }

    /// Decode the incoming headers. Later calls are no-ops.
    pub fn prepare(&mut self, headers: &HeaderMap) {
        if self.decoded.is_none() {
            self.decoded = Some(codec::decode_all(headers, &self.signer));
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.decoded.is_some()
    }

    /// The decoded payload, still carrying its type tag.
    pub fn get_raw(&self, name: &str) -> Result<Option<&str>, CookieError> {
        let decoded = self.decoded.as_ref().ok_or(CookieError::NotPrepared)?;
        Ok(decoded
            .get(name)
            .map(String::as_str)
            .filter(|raw| !raw.is_empty()))
    }

    /// Every decoded cookie, payloads still tagged.
    pub fn raw_all(&self) -> Result<&HashMap<String, String>, CookieError> {
        self.decoded.as_ref().ok_or(CookieError::NotPrepared)
    }

    /// The typed value, or `None` if missing or corrupt.
    pub fn get_value(&self, name: &str) -> Result<Option<CookieValue>, CookieError> {
        Ok(self.get_raw(name)?.and_then(CookieValue::decode))
    }

    /// Deserialize the cookie into `T`. A value of the wrong shape is absent.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CookieError> {
        let Some(value) = self.get_value(name)? else {
            return Ok(None);
        };

        match serde_json::from_value(value.into_json()) {
            Ok(typed) => Ok(Some(typed)),
            Err(e) => {
                tracing::warn!(cookie = %name, error = %e, "Cookie does not match the requested type");
                Ok(None)
            }
        }
    }

    /// Write a typed cookie onto `headers`.
    pub fn set(
        &self,
        headers: &mut HeaderMap,
        name: &str,
        value: impl Into<CookieValue>,
        options: &CookieOptions,
    ) -> Result<(), CookieError> {
        self.set_raw(headers, name, &value.into().encode(), options)
    }

    /// Write an already-encoded payload onto `headers`.
    pub fn set_raw(
        &self,
        headers: &mut HeaderMap,
        name: &str,
        value: &str,
        options: &CookieOptions,
    ) -> Result<(), CookieError> {
        codec::set_cookie(headers, &self.signer, name, value, options)
    }
}
