//! Module loading.
//!
//! # Responsibilities
//! - Define the loader seam used by the cache on a miss
//! - Provide an in-process registry of module factories
//!
//! # Design Decisions
//! - Every load builds a fresh handler set; loaders keep no cache of their own
//! - Load-time failures (missing module, factory error, factory panic)
//!   are reported as `LoadError`, never propagated as panics

use std::error::Error as StdError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::cache::{HandlerSet, ModuleId};

/// Errors produced while loading a module.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// No module is known under this id.
    #[error("module `{0}` does not exist")]
    NotFound(ModuleId),

    /// The module exists but raised while being loaded.
    #[error("module `{id}` failed to load: {reason}")]
    Failed { id: ModuleId, reason: String },

    /// The load did not settle within the configured bound.
    #[error("module `{id}` did not load within {timeout:?}")]
    TimedOut { id: ModuleId, timeout: Duration },
}

/// A request to load one module.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub id: ModuleId,
    /// Monotonic discriminator, distinct for every load the cache starts.
    pub generation: u64,
}

/// Produces handler sets for module ids.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, request: &LoadRequest) -> Result<HandlerSet, LoadError>;
}

type FactoryError = Box<dyn StdError + Send + Sync>;
type Factory = Arc<dyn Fn(&LoadRequest) -> Result<HandlerSet, FactoryError> + Send + Sync>;

/// In-process loader backed by registered factories.
///
/// Factories are called anew on every load, so re-registering a module and
/// invalidating its cache entry swaps the code that serves it.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: Arc<DashMap<ModuleId, Factory>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for a module.
    pub fn register<F>(&self, id: impl Into<ModuleId>, factory: F)
    where
        F: Fn(&LoadRequest) -> Result<HandlerSet, FactoryError> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    /// Register a module whose handler set never fails to build.
    pub fn register_set<F>(&self, id: impl Into<ModuleId>, build: F)
    where
        F: Fn() -> HandlerSet + Send + Sync + 'static,
    {
        self.register(id, move |_| Ok(build()));
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.factories.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[async_trait]
impl ModuleLoader for ModuleRegistry {
    async fn load(&self, request: &LoadRequest) -> Result<HandlerSet, LoadError> {
        let factory = self
            .factories
            .get(request.id.as_str())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LoadError::NotFound(request.id.clone()))?;

        match catch_unwind(AssertUnwindSafe(|| factory(request))) {
            Ok(Ok(handlers)) => Ok(handlers),
            Ok(Err(e)) => Err(LoadError::Failed {
                id: request.id.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(LoadError::Failed {
                id: request.id.clone(),
                reason: "panicked while loading".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(id: &str) -> LoadRequest {
        LoadRequest {
            id: ModuleId::from(id),
            generation: 1,
        }
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let registry = ModuleRegistry::new();
        let err = registry.load(&request("/missing")).await.unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_factory_runs_every_load() {
        let registry = ModuleRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register_set("/m", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            HandlerSet::new()
        });

        registry.load(&request("/m")).await.unwrap();
        registry.load(&request("/m")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_factory_error_and_panic() {
        let registry = ModuleRegistry::new();
        registry.register("/err", |_| Err("syntax error at line 3".into()));
        registry.register("/panic", |_| panic!("boom"));

        match registry.load(&request("/err")).await.unwrap_err() {
            LoadError::Failed { reason, .. } => assert!(reason.contains("syntax error")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            registry.load(&request("/panic")).await.unwrap_err(),
            LoadError::Failed { .. }
        ));
    }
}
