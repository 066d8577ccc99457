//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → RequestContext
//!     → dispatcher.rs (resolve → middlewares → fallbacks → controller)
//!     → http::response::normalize
//!     → Response
//!
//! File watcher
//!     → invalidation.rs
//!     → Dispatcher::apply_invalidation (cache + resolver)
//! ```

pub mod dispatcher;
pub mod invalidation;

pub use dispatcher::{Dispatcher, Stage};
pub use invalidation::spawn_invalidation_task;
