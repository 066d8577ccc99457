//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the runtime.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Cookie signing settings.
    pub cookies: CookieConfig,

    /// Source watching for hot invalidation.
    pub watch: WatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body size in bytes.
    pub body_limit_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Upper bound on a single module load in milliseconds.
    pub module_load_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            module_load_ms: 10_000,
        }
    }
}

/// Cookie signing configuration.
///
/// The secret is taken from `secret` if set, else from the environment
/// variable named by `secret_env`.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    pub secret_env: String,
    pub secret: Option<String>,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            secret_env: "ARBOR_COOKIE_SECRET".to_string(),
            secret: None,
        }
    }
}

impl std::fmt::Debug for CookieConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieConfig")
            .field("secret_env", &self.secret_env)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,

    /// Directory watched recursively.
    pub root: PathBuf,

    /// Poll interval for backends that poll, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: PathBuf::from("routes"),
            poll_interval_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Filter directives; `RUST_LOG` takes precedence when set.
    pub log_filter: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "arbor_runtime=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: RuntimeConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:8080");
        assert_eq!(config.cookies.secret_env, "ARBOR_COOKIE_SECRET");
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert!(!config.watch.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config: RuntimeConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "0.0.0.0:3000"

            [cookies]
            secret = "s3cret"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.listener.body_limit_bytes, 2 * 1024 * 1024);
        assert_eq!(config.cookies.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_secret_is_redacted() {
        let config = CookieConfig {
            secret: Some("s3cret".into()),
            ..CookieConfig::default()
        };
        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
