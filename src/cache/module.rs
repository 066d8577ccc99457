//! Handler modules and their identifiers.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::http::{HandlerOutput, RequestContext};

/// Stable absolute identifier of a handler module; the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier of the module backed by a file.
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A callable bound to one method (or the default slot) of a module.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut RequestContext) -> HandlerOutput;
}

/// Adapter turning a closure into a [`Handler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerOutput> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &mut RequestContext) -> HandlerOutput {
        (self.0)(ctx).await
    }
}

/// Build a handler from a closure returning a boxed future.
///
/// ```ignore
/// let hello = handler_fn(|ctx| Box::pin(async move {
///     HandlerOutput::from(response::text(StatusCode::OK, format!("Matched {}", ctx.pathname())))
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HandlerOutput> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// HTTP methods a module can bind a handler to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodSlot {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl MethodSlot {
    pub fn from_method(method: &Method) -> Option<Self> {
        match method.as_str() {
            "GET" => Some(MethodSlot::Get),
            "POST" => Some(MethodSlot::Post),
            "PUT" => Some(MethodSlot::Put),
            "PATCH" => Some(MethodSlot::Patch),
            "DELETE" => Some(MethodSlot::Delete),
            "HEAD" => Some(MethodSlot::Head),
            "OPTIONS" => Some(MethodSlot::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MethodSlot::Get => "GET",
            MethodSlot::Post => "POST",
            MethodSlot::Put => "PUT",
            MethodSlot::Patch => "PATCH",
            MethodSlot::Delete => "DELETE",
            MethodSlot::Head => "HEAD",
            MethodSlot::Options => "OPTIONS",
        }
    }
}

/// The handlers exported by one module: per-method plus an optional default.
#[derive(Clone, Default)]
pub struct HandlerSet {
    methods: HashMap<MethodSlot, Arc<dyn Handler>>,
    default: Option<Arc<dyn Handler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, slot: MethodSlot, handler: Arc<dyn Handler>) -> Self {
        self.methods.insert(slot, handler);
        self
    }

    pub fn get(self, handler: Arc<dyn Handler>) -> Self {
        self.on(MethodSlot::Get, handler)
    }

    pub fn post(self, handler: Arc<dyn Handler>) -> Self {
        self.on(MethodSlot::Post, handler)
    }

    pub fn put(self, handler: Arc<dyn Handler>) -> Self {
        self.on(MethodSlot::Put, handler)
    }

    pub fn patch(self, handler: Arc<dyn Handler>) -> Self {
        self.on(MethodSlot::Patch, handler)
    }

    pub fn delete(self, handler: Arc<dyn Handler>) -> Self {
        self.on(MethodSlot::Delete, handler)
    }

    /// Handler used when no method-specific one exists.
    pub fn any(mut self, handler: Arc<dyn Handler>) -> Self {
        self.default = Some(handler);
        self
    }

    /// The method-specific handler, else the default one.
    pub fn handler_for(&self, method: &Method) -> Option<Arc<dyn Handler>> {
        MethodSlot::from_method(method)
            .and_then(|slot| self.methods.get(&slot))
            .or(self.default.as_ref())
            .cloned()
    }

    pub fn slots(&self) -> impl Iterator<Item = MethodSlot> + '_ {
        self.methods.keys().copied()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.default.is_none()
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSet")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// A loaded module as stored by the cache.
#[derive(Debug)]
pub struct CachedModule {
    pub id: ModuleId,
    /// Discriminator of the load that produced this entry.
    pub generation: u64,
    pub handlers: HandlerSet,
}

impl CachedModule {
    pub fn handler_for(&self, method: &Method) -> Option<Arc<dyn Handler>> {
        self.handlers.handler_for(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response;
    use axum::http::StatusCode;

    fn tagged(tag: &'static str) -> Arc<dyn Handler> {
        handler_fn(move |_ctx| {
            Box::pin(async move { HandlerOutput::from(response::text(StatusCode::OK, tag)) })
        })
    }

    #[test]
    fn test_method_then_default() {
        let set = HandlerSet::new().get(tagged("get")).any(tagged("any"));
        assert!(set.handler_for(&Method::GET).is_some());
        assert!(set.handler_for(&Method::DELETE).is_some());
        assert!(set.has_default());
    }

    #[test]
    fn test_missing_method_without_default() {
        let set = HandlerSet::new().post(tagged("post"));
        assert!(set.handler_for(&Method::GET).is_none());
        assert!(set.handler_for(&Method::from_bytes(b"PURGE").unwrap()).is_none());
    }

    #[test]
    fn test_unknown_method_uses_default() {
        let set = HandlerSet::new().any(tagged("any"));
        assert!(set.handler_for(&Method::from_bytes(b"PURGE").unwrap()).is_some());
    }

    #[test]
    fn test_module_id_from_path() {
        let id = ModuleId::from_path(Path::new("/srv/routes/_index.rs"));
        assert_eq!(id.as_str(), "/srv/routes/_index.rs");
        assert_eq!(id, ModuleId::from("/srv/routes/_index.rs"));
    }
}
