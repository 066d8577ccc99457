//! Process-lifetime cache of loaded modules.
//!
//! # States per key
//! ```text
//! absent ──resolve──▶ loading (latch) ──ok──▶ cached ──invalidate/clear──▶ absent
//!                          │
//!                          └──err/timeout──▶ absent (logged, not retried)
//! ```
//!
//! # Design Decisions
//! - Concurrent misses on one key share a single in-flight load
//! - Each load runs on its own task and settles the latch itself, so a
//!   load whose waiters are all cancelled still finishes and releases the key
//! - Invalidating a key while it loads discards that load's result
//! - Lock order is always `in_flight` before `entries`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::cache::{CachedModule, LoadError, LoadRequest, ModuleId, ModuleLoader};
use crate::observability::metrics;

/// Default bound on a single module load.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

type LoadResult = Result<Arc<CachedModule>, LoadError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

struct InFlight {
    generation: u64,
    load: SharedLoad,
}

enum Lookup {
    Ready(Arc<CachedModule>),
    Pending(SharedLoad),
}

/// Keyed cache of loaded handler modules.
pub struct ModuleCache {
    loader: Arc<dyn ModuleLoader>,
    entries: Arc<DashMap<ModuleId, Arc<CachedModule>>>,
    in_flight: Arc<DashMap<ModuleId, InFlight>>,
    generation: AtomicU64,
    load_timeout: Duration,
}

impl ModuleCache {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            entries: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
        }
    }

    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    /// Pure lookup; never loads.
    pub fn get(&self, id: &str) -> Option<Arc<CachedModule>> {
        self.entries.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Return the cached module, loading it on a miss.
    pub async fn resolve(&self, id: &ModuleId) -> LoadResult {
        if let Some(module) = self.get(id.as_str()) {
            metrics::record_cache_lookup("hit");
            return Ok(module);
        }

        let load = match self.join_or_start(id) {
            Lookup::Ready(module) => {
                metrics::record_cache_lookup("hit");
                return Ok(module);
            }
            Lookup::Pending(load) => load,
        };

        metrics::record_cache_lookup("miss");
        load.await
    }

    /// Drop one entry. A load in progress for it is abandoned.
    pub fn invalidate(&self, id: &str) -> bool {
        let removed = self.entries.remove(id).is_some();
        let abandoned = self.in_flight.remove(id).is_some();

        metrics::record_cache_invalidation("module");
        tracing::debug!(module = %id, removed, abandoned, "Module cache entry invalidated");
        removed
    }

    /// Drop every entry and abandon every load in progress.
    pub fn clear(&self) {
        let cleared = self.entries.len();
        self.entries.clear();
        self.in_flight.clear();

        metrics::record_cache_invalidation("all");
        tracing::info!(cleared, "Module cache cleared");
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of loads started so far.
    pub fn loads_started(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of loads currently holding a latch.
    pub fn loads_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn join_or_start(&self, id: &ModuleId) -> Lookup {
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(latch) => Lookup::Pending(latch.get().load.clone()),
            Entry::Vacant(slot) => {
                // A load may have settled between the first lookup and taking the latch.
                if let Some(module) = self.get(id.as_str()) {
                    return Lookup::Ready(module);
                }

                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let load = self.start_load(id.clone(), generation);
                slot.insert(InFlight {
                    generation,
                    load: load.clone(),
                });
                Lookup::Pending(load)
            }
        }
    }

    /// Spawn the load. The task settles the latch before its result is
    /// observable, whether or not anyone is still waiting on it.
    fn start_load(&self, id: ModuleId, generation: u64) -> SharedLoad {
        let loader = Arc::clone(&self.loader);
        let entries = Arc::clone(&self.entries);
        let in_flight = Arc::clone(&self.in_flight);
        let timeout = self.load_timeout;
        let task_id = id.clone();

        let task = {
            let entries = Arc::clone(&entries);
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(async move {
                let id = task_id;
                let result = load_module(loader.as_ref(), id.clone(), generation, timeout).await;
                settle(&in_flight, &entries, &id, generation, &result);
                result
            })
        };

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    metrics::record_module_load("error");
                    tracing::error!(module = %id, generation, error = %e, "Module load task failed");
                    let result = Err(LoadError::Failed {
                        id: id.clone(),
                        reason: e.to_string(),
                    });
                    settle(&in_flight, &entries, &id, generation, &result);
                    result
                }
            }
        }
        .boxed()
        .shared()
    }
}

async fn load_module(
    loader: &dyn ModuleLoader,
    id: ModuleId,
    generation: u64,
    timeout: Duration,
) -> LoadResult {
    let request = LoadRequest {
        id: id.clone(),
        generation,
    };
    tracing::debug!(module = %id, generation, "Loading module");

    let outcome = match tokio::time::timeout(timeout, loader.load(&request)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(LoadError::TimedOut {
            id: id.clone(),
            timeout,
        }),
    };

    match outcome {
        Ok(handlers) => {
            metrics::record_module_load("ok");
            Ok(Arc::new(CachedModule {
                id,
                generation,
                handlers,
            }))
        }
        Err(e) => {
            metrics::record_module_load("error");
            tracing::error!(module = %id, generation, error = %e, "Module load failed");
            Err(e)
        }
    }
}

/// Store the result and release the latch, if the latch is still ours.
fn settle(
    in_flight: &DashMap<ModuleId, InFlight>,
    entries: &DashMap<ModuleId, Arc<CachedModule>>,
    id: &ModuleId,
    generation: u64,
    result: &LoadResult,
) {
    if let Entry::Occupied(latch) = in_flight.entry(id.clone()) {
        if latch.get().generation == generation {
            if let Ok(module) = result {
                entries.insert(id.clone(), Arc::clone(module));
            }
            latch.remove();
        }
    }
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("entries", &self.entries.len())
            .field("in_flight", &self.in_flight.len())
            .field("loads_started", &self.loads_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::HandlerSet;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Loader that counts calls and can be held open.
    #[derive(Default)]
    struct GatedLoader {
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    #[async_trait]
    impl ModuleLoader for GatedLoader {
        async fn load(&self, request: &LoadRequest) -> Result<HandlerSet, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(LoadError::Failed {
                    id: request.id.clone(),
                    reason: "broken".into(),
                });
            }
            Ok(HandlerSet::new())
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let loader = Arc::new(GatedLoader::default());
        let cache = ModuleCache::new(loader.clone());
        let id = ModuleId::from("/a");

        assert!(cache.get("/a").is_none());
        let first = cache.resolve(&id).await.unwrap();
        let second = cache.resolve(&id).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("/a"));
    }

    #[tokio::test]
    async fn test_invalidate_forces_fresh_load() {
        let loader = Arc::new(GatedLoader::default());
        let cache = ModuleCache::new(loader.clone());
        let id = ModuleId::from("/a");

        let first = cache.resolve(&id).await.unwrap();
        assert!(cache.invalidate("/a"));
        assert!(cache.get("/a").is_none());
        let second = cache.resolve(&id).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.generation > first.generation);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let cache = ModuleCache::new(Arc::new(GatedLoader::default()));
        cache.resolve(&ModuleId::from("/a")).await.unwrap();
        cache.resolve(&ModuleId::from("/b")).await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let loader = Arc::new(GatedLoader {
            fail: true,
            ..GatedLoader::default()
        });
        let cache = ModuleCache::new(loader.clone());
        let id = ModuleId::from("/broken");

        assert!(cache.resolve(&id).await.is_err());
        assert!(cache.is_empty());
        assert!(cache.in_flight.is_empty());

        assert!(cache.resolve(&id).await.is_err());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_load() {
        let gate = Arc::new(Notify::new());
        let loader = Arc::new(GatedLoader {
            gate: Some(gate.clone()),
            ..GatedLoader::default()
        });
        let cache = Arc::new(ModuleCache::new(loader.clone()));
        let id = ModuleId::from("/shared");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let id = id.clone();
                tokio::spawn(async move { cache.resolve(&id).await })
            })
            .collect();

        while loader.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_one();

        let mut modules = Vec::new();
        for task in tasks {
            modules.push(task.await.unwrap().unwrap());
        }

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(modules.iter().all(|m| Arc::ptr_eq(m, &modules[0])));
        assert!(cache.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_during_load_discards_result() {
        let gate = Arc::new(Notify::new());
        let loader = Arc::new(GatedLoader {
            gate: Some(gate.clone()),
            ..GatedLoader::default()
        });
        let cache = Arc::new(ModuleCache::new(loader.clone()));

        let pending = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve(&ModuleId::from("/late")).await })
        };
        while loader.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        cache.invalidate("/late");
        gate.notify_one();

        assert!(pending.await.unwrap().is_ok());
        assert!(cache.get("/late").is_none());
    }

    #[tokio::test]
    async fn test_load_timeout_releases_latch() {
        let loader = Arc::new(GatedLoader {
            gate: Some(Arc::new(Notify::new())),
            ..GatedLoader::default()
        });
        let cache = ModuleCache::new(loader).with_load_timeout(Duration::from_millis(20));

        let err = cache.resolve(&ModuleId::from("/stuck")).await.unwrap_err();
        assert!(matches!(err, LoadError::TimedOut { .. }));
        assert!(cache.in_flight.is_empty());
    }

    /// Loader that yields twice before producing a module.
    struct SlowLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModuleLoader for SlowLoader {
        async fn load(&self, _request: &LoadRequest) -> Result<HandlerSet, LoadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(25)).await;
            tokio::time::sleep(Duration::from_millis(25)).await;
            Ok(HandlerSet::new())
        }
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_strand_load() {
        let loader = Arc::new(SlowLoader {
            calls: AtomicUsize::new(0),
        });
        let cache = ModuleCache::new(loader.clone()).with_load_timeout(Duration::from_millis(100));
        let id = ModuleId::from("/slow");

        let cancelled = tokio::time::timeout(Duration::from_millis(10), cache.resolve(&id)).await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.loads_in_flight(), 0);
        assert!(cache.contains("/slow"));

        assert!(cache.resolve(&id).await.is_ok());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }
}
