//! Arbor request-dispatch runtime library.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    ARBOR RUNTIME                      │
//!                 │                                                       │
//!   Request       │  ┌────────┐   ┌────────────┐   ┌──────────────────┐  │
//!   ──────────────┼─▶│  http  │──▶│  dispatch  │──▶│ routing (resolve)│  │
//!                 │  │ server │   │ Dispatcher │   └──────────────────┘  │
//!                 │  └────────┘   └─────┬──────┘                          │
//!                 │                     │ middlewares → fallbacks → ctrl  │
//!                 │                     ▼                                 │
//!                 │              ┌─────────────┐   ┌──────────────────┐  │
//!                 │              │    cache    │◀──│ watcher (notify) │  │
//!                 │              │ ModuleCache │   └──────────────────┘  │
//!                 │              └─────┬───────┘                          │
//!                 │                    ▼                                  │
//!   Response      │  ┌────────────────────────┐   ┌──────────────────┐   │
//!   ◀─────────────┼──│ http::response         │◀──│ handler + cookies│   │
//!                 │  │ normalize + merge hdrs │   └──────────────────┘   │
//!                 │  └────────────────────────┘                           │
//!                 └──────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod cookies;
pub mod demo;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use cache::{ModuleCache, ModuleRegistry};
pub use config::schema::RuntimeConfig;
pub use dispatch::Dispatcher;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
