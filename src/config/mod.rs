//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RuntimeConfig (validated, immutable)
//!     → read once at startup by main and the server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, override_bind, parse_config, ConfigError};
pub use schema::{
    CookieConfig, ListenerConfig, LogFormat, ObservabilityConfig, RuntimeConfig, TimeoutConfig,
    WatchConfig,
};
pub use validation::{validate_config, ValidationError};
