//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → request.rs (request ID)
//!     → context.rs (RequestContext for the pipeline)
//!     → [dispatch runs handlers]
//!     → response.rs (normalize handler output, merge headers)
//!     → Send to client
//! ```

pub mod context;
pub mod request;
pub mod response;
pub mod server;

pub use context::RequestContext;
pub use request::X_REQUEST_ID;
pub use response::{HandlerOutput, HttpError, RawError};
pub use server::HttpServer;
