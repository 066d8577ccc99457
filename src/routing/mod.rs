//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext (segments)
//!     → ResolverSlot (lazily loaded from a ResolverSource)
//!     → RouteResolver::resolve
//!     → Return: RouteResolution or None (routing miss)
//! ```
//!
//! # Design Decisions
//! - Resolution is synchronous and never touches the module cache
//! - Deterministic: same input always resolves to the same modules
//! - First match wins (declaration order)

pub mod resolution;
pub mod table;

pub use resolution::{
    ResolveError, ResolverSlot, ResolverSource, RouteResolution, RouteResolver, StaticSource,
};
pub use table::{RouteEntry, RoutePattern, RouteTable};
