//! HMAC-SHA256 cookie signing.
//!
//! The signing secret is resolved once when the signer is built:
//! inline config secret, then the configured environment variable, then
//! [`FALLBACK_SECRET`]. The fallback is insecure: anyone who reads this
//! source can forge signed cookies. Using it logs a warning once per process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::CookieConfig;
use crate::cookies::CookieError;

type HmacSha256 = Hmac<Sha256>;

/// Secret used when none is configured. Not safe for production.
pub const FALLBACK_SECRET: &str = "arbor-insecure-fallback-secret";

static FALLBACK_WARNING: Once = Once::new();
static FALLBACK_WARNINGS: AtomicUsize = AtomicUsize::new(0);

/// Signs and verifies cookie plaintexts.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
    insecure: bool,
}

impl CookieSigner {
    /// Create a signer from an explicit secret.
    pub fn new(secret: &[u8]) -> Result<Self, CookieError> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| CookieError::Key(e.to_string()))?;
        Ok(Self {
            mac,
            insecure: false,
        })
    }

    /// Create a signer using the insecure fallback secret.
    pub fn insecure_fallback(secret_env: &str) -> Result<Self, CookieError> {
        FALLBACK_WARNING.call_once(|| {
            FALLBACK_WARNINGS.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                env = %secret_env,
                "Cookie secret is not set, signing with the insecure fallback secret"
            );
        });
        let mut signer = Self::new(FALLBACK_SECRET.as_bytes())?;
        signer.insecure = true;
        Ok(signer)
    }

    /// Resolve the secret from configuration and the environment.
    pub fn from_config(config: &CookieConfig) -> Result<Self, CookieError> {
        if let Some(secret) = config.secret.as_deref().filter(|s| !s.is_empty()) {
            return Self::new(secret.as_bytes());
        }

        match std::env::var(&config.secret_env) {
            Ok(secret) if !secret.is_empty() => Self::new(secret.as_bytes()),
            _ => Self::insecure_fallback(&config.secret_env),
        }
    }

    /// Whether this signer uses the fallback secret.
    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// Base64 HMAC of the plaintext.
    pub fn sign(&self, plaintext: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(plaintext.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Verify a base64 signature against the plaintext in constant time.
    /// An undecodable signature never verifies.
    pub fn verify(&self, signature: &str, plaintext: &str) -> bool {
        let Ok(signature) = STANDARD.decode(signature) else {
            return false;
        };
        let mut mac = self.mac.clone();
        mac.update(plaintext.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner")
            .field("insecure", &self.insecure)
            .finish_non_exhaustive()
    }
}

/// How many times the fallback warning was emitted in this process.
pub(crate) fn fallback_warnings() -> usize {
    FALLBACK_WARNINGS.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let signer = CookieSigner::new(b"secret").unwrap();
        let signature = signer.sign("hello");
        assert!(signer.verify(&signature, "hello"));
        assert!(!signer.verify(&signature, "hellO"));
    }

    #[test]
    fn test_different_keys_disagree() {
        let a = CookieSigner::new(b"one").unwrap();
        let b = CookieSigner::new(b"two").unwrap();
        assert!(!b.verify(&a.sign("data"), "data"));
    }

    #[test]
    fn test_garbage_signature() {
        let signer = CookieSigner::new(b"secret").unwrap();
        assert!(!signer.verify("%%%not-base64", "hello"));
        assert!(!signer.verify("", "hello"));
    }

    #[test]
    fn test_inline_secret_wins() {
        let config = CookieConfig {
            secret_env: "ARBOR_TEST_UNSET_SECRET_VAR".into(),
            secret: Some("inline".into()),
        };
        let signer = CookieSigner::from_config(&config).unwrap();
        assert!(!signer.is_insecure());
        let direct = CookieSigner::new(b"inline").unwrap();
        assert!(direct.verify(&signer.sign("x"), "x"));
    }

    #[test]
    fn test_fallback_warns_once_per_process() {
        let config = CookieConfig {
            secret_env: "ARBOR_TEST_UNSET_SECRET_VAR".into(),
            secret: None,
        };
        let first = CookieSigner::from_config(&config).unwrap();
        let second = CookieSigner::from_config(&config).unwrap();

        assert!(first.is_insecure());
        assert!(second.is_insecure());
        assert!(second.verify(&first.sign("round"), "round"));
        assert_eq!(fallback_warnings(), 1);
    }
}
