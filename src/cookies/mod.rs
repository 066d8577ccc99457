//! Cookie subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming `Cookie` headers
//!     → codec.rs (split pairs, verify `s:` signatures, percent-decode)
//!     → jar.rs (decoded name → payload map, prepared once per request)
//!     → value.rs (2-char type tag → CookieValue)
//!
//! Outgoing:
//!     CookieValue → value.rs (tagged payload)
//!     → signer.rs (HMAC-SHA256, unless raw)
//!     → options.rs (Set-Cookie attributes)
//!     → appended to the request's response headers
//! ```
//!
//! # Design Decisions
//! - A tampered or undecodable signed cookie is dropped, never surfaced
//! - One bad cookie never affects its siblings
//! - Reading the jar before it is prepared is a programmer error

pub mod codec;
pub mod jar;
pub mod options;
pub mod signer;
pub mod value;

use thiserror::Error;

pub use codec::{decode_all, set_cookie};
pub use jar::CookieJar;
pub use options::{CookieOptions, SameSite};
pub use signer::{CookieSigner, FALLBACK_SECRET};
pub use value::CookieValue;

/// Errors raised by the cookie subsystem.
#[derive(Debug, Error)]
pub enum CookieError {
    /// The jar was read before `RequestContext::prepare` ran.
    #[error("cookie jar read before it was prepared; call `prepare()` first")]
    NotPrepared,

    /// The cookie name or rendered value is not a valid header value.
    #[error("invalid cookie header for `{name}`: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The signing key could not be initialized.
    #[error("invalid signing key: {0}")]
    Key(String),
}

impl CookieError {
    /// Whether this error signals a defect in handler code rather than bad input.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, CookieError::NotPrepared)
    }
}
