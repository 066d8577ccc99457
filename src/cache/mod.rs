//! Loaded-module cache and hot invalidation.
//!
//! # Data Flow
//! ```text
//! Dispatcher ──resolve(id)──▶ ModuleCache ──miss──▶ ModuleLoader::load
//!                                  ▲
//! ModuleWatcher ──InvalidationEvent──┘ (invalidate / clear)
//! ```

pub mod loader;
pub mod module;
pub mod store;
pub mod watcher;

pub use loader::{LoadError, LoadRequest, ModuleLoader, ModuleRegistry};
pub use module::{handler_fn, CachedModule, FnHandler, Handler, HandlerSet, MethodSlot, ModuleId};
pub use store::{ModuleCache, DEFAULT_LOAD_TIMEOUT};
pub use watcher::{events_for, ChangeKind, InvalidationEvent, ModuleWatcher, WatchError};
