//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::RuntimeConfig;

/// One failed semantic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &RuntimeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.body_limit_bytes == 0 {
        errors.push(ValidationError::new("listener.body_limit_bytes", "must be > 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.timeouts.module_load_ms == 0 {
        errors.push(ValidationError::new("timeouts.module_load_ms", "must be > 0"));
    }

    if config.cookies.secret.as_deref().is_some_and(str::is_empty) {
        errors.push(ValidationError::new(
            "cookies.secret",
            "must not be empty; omit it to read the secret from the environment",
        ));
    }
    if config.cookies.secret_env.trim().is_empty() {
        errors.push(ValidationError::new("cookies.secret_env", "must not be empty"));
    }

    if config.watch.enabled {
        if config.watch.root.as_os_str().is_empty() {
            errors.push(ValidationError::new("watch.root", "must not be empty"));
        }
        if config.watch.poll_interval_ms == 0 {
            errors.push(ValidationError::new("watch.poll_interval_ms", "must be > 0"));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "`{}` is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&RuntimeConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = RuntimeConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.timeouts.module_load_ms = 0;
        config.cookies.secret = Some(String::new());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            ["listener.bind_address", "timeouts.module_load_ms", "cookies.secret"]
        );
    }

    #[test]
    fn test_watch_checked_only_when_enabled() {
        let mut config = RuntimeConfig::default();
        config.watch.poll_interval_ms = 0;
        assert!(validate_config(&config).is_ok());

        config.watch.enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
