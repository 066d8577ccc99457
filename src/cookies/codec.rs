//! Cookie wire format.
//!
//! - unsigned: `name=<percent-encoded value>`
//! - signed:   `name=s:<base64(value)>.<base64(hmac-sha256(value))>`

use std::collections::HashMap;

use axum::http::{header, HeaderMap, HeaderValue};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::cookies::{CookieError, CookieOptions, CookieSigner};
use crate::observability::metrics;

const SIGNED_MARKER: &str = "s:";

/// Parse every `Cookie` header into a name → plaintext map.
///
/// Signed entries that fail to decode or verify are dropped individually.
pub fn decode_all(headers: &HeaderMap, signer: &CookieSigner) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for header_value in headers.get_all(header::COOKIE) {
        for raw_pair in header_value.as_bytes().split(|&b| b == b';') {
            let Ok(pair) = std::str::from_utf8(raw_pair) else {
                tracing::warn!("Cookie pair is not valid UTF-8, skipping");
                continue;
            };
            let Some((name, value)) = pair.trim().split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            match value.strip_prefix(SIGNED_MARKER) {
                Some(signed) => match unsign(signed, signer) {
                    Ok(plaintext) => {
                        cookies.insert(name.to_string(), plaintext);
                    }
                    Err(reason) => {
                        tracing::warn!(cookie = %name, reason, "Dropping signed cookie");
                        metrics::record_cookie_rejected(reason);
                        cookies.remove(name);
                    }
                },
                None => {
                    let decoded = match urlencoding::decode(value) {
                        Ok(decoded) => decoded.into_owned(),
                        Err(_) => {
                            tracing::warn!(cookie = %name, "Cookie is not valid percent-encoding, keeping raw value");
                            value.to_string()
                        }
                    };
                    cookies.insert(name.to_string(), decoded);
                }
            }
        }
    }

    cookies
}

/// Wrap a plaintext into the signed wire form.
pub fn sign_value(plaintext: &str, signer: &CookieSigner) -> String {
    format!(
        "{SIGNED_MARKER}{}.{}",
        STANDARD.encode(plaintext),
        signer.sign(plaintext)
    )
}

/// Verify `<base64 value>.<base64 signature>` and return the plaintext.
fn unsign(signed: &str, signer: &CookieSigner) -> Result<String, &'static str> {
    let (value, signature) = signed.split_once('.').ok_or("missing_signature")?;
    let bytes = STANDARD.decode(value).map_err(|_| "bad_base64")?;
    let plaintext = String::from_utf8(bytes).map_err(|_| "bad_utf8")?;

    if signer.verify(signature, &plaintext) {
        Ok(plaintext)
    } else {
        Err("bad_signature")
    }
}

/// Append a `Set-Cookie` header. Earlier cookies on the same response are kept.
pub fn set_cookie(
    headers: &mut HeaderMap,
    signer: &CookieSigner,
    name: &str,
    value: &str,
    options: &CookieOptions,
) -> Result<(), CookieError> {
    let wire_value = if options.raw {
        urlencoding::encode(value).into_owned()
    } else {
        sign_value(value, signer)
    };

    let rendered = options.render(name, &wire_value);
    let header_value = HeaderValue::from_str(&rendered).map_err(|e| CookieError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    headers.append(header::SET_COOKIE, header_value);
    Ok(())
}
