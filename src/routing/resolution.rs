//! The routing seam: what a route resolves to and where resolvers come from.
//!
//! # Responsibilities
//! - Describe a resolved route as ordered module ids plus path parameters
//! - Load the resolver lazily and keep it until told it is stale
//!
//! # Design Decisions
//! - The resolver slot is lock-free (`arc-swap`); requests never block on it
//! - A reset during a reload wins: the reloaded resolver is not kept

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use thiserror::Error;

use crate::cache::ModuleId;
use crate::http::RequestContext;

#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("routing table unavailable: {0}")]
    Unavailable(String),

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// The modules that apply to one request, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResolution {
    pub middlewares: Vec<ModuleId>,
    pub fallbacks: Vec<ModuleId>,
    pub controller: ModuleId,
    pub params: HashMap<String, String>,
}

impl RouteResolution {
    pub fn new(controller: impl Into<ModuleId>) -> Self {
        Self {
            middlewares: Vec::new(),
            fallbacks: Vec::new(),
            controller: controller.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_middleware(mut self, id: impl Into<ModuleId>) -> Self {
        self.middlewares.push(id.into());
        self
    }

    pub fn with_fallback(mut self, id: impl Into<ModuleId>) -> Self {
        self.fallbacks.push(id.into());
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Maps a request to the modules that should handle it.
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, ctx: &RequestContext) -> Option<RouteResolution>;
}

impl<F> RouteResolver for F
where
    F: Fn(&RequestContext) -> Option<RouteResolution> + Send + Sync,
{
    fn resolve(&self, ctx: &RequestContext) -> Option<RouteResolution> {
        self(ctx)
    }
}

/// Produces the current resolver, e.g. from a compiled routing table.
#[async_trait]
pub trait ResolverSource: Send + Sync {
    async fn load(&self) -> Result<Box<dyn RouteResolver>, ResolveError>;
}

/// A source that always hands out the same resolver.
#[derive(Clone)]
pub struct StaticSource {
    resolver: Arc<dyn RouteResolver>,
}

impl StaticSource {
    pub fn new<R: RouteResolver + 'static>(resolver: R) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

#[async_trait]
impl ResolverSource for StaticSource {
    async fn load(&self) -> Result<Box<dyn RouteResolver>, ResolveError> {
        let shared = Arc::clone(&self.resolver);
        Ok(Box::new(move |ctx: &RequestContext| shared.resolve(ctx)))
    }
}

/// Lazily loaded, resettable holder of the active resolver.
pub struct ResolverSlot {
    source: Arc<dyn ResolverSource>,
    current: ArcSwapOption<Box<dyn RouteResolver>>,
    epoch: AtomicU64,
}

impl ResolverSlot {
    pub fn new(source: Arc<dyn ResolverSource>) -> Self {
        Self {
            source,
            current: ArcSwapOption::empty(),
            epoch: AtomicU64::new(0),
        }
    }

    /// The active resolver, loading it first if needed.
    pub async fn current(&self) -> Result<Arc<Box<dyn RouteResolver>>, ResolveError> {
        if let Some(resolver) = self.current.load_full() {
            return Ok(resolver);
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let loaded = Arc::new(self.source.load().await?);

        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.current.store(Some(Arc::clone(&loaded)));
            tracing::debug!("Route resolver loaded");
        }
        Ok(loaded)
    }

    /// Forget the active resolver; the next request reloads it.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.current.store(None);
        tracing::info!("Route resolver discarded");
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }
}
