//! Process-wide registry of named caches, created on first use.

use crate::cache::LiveCache;
use crate::error::{CacheError, Result};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

type AnyCache = Arc<dyn Any + Send + Sync>;

/// Holds one [`LiveCache`] per name, so every consumer of a resource kind
/// shares the same store, listeners and refresh loops.
///
/// Inject a `CacheContext` where possible; [`CacheContext::global`] exists for
/// code that cannot thread one through. [`reset`](CacheContext::reset) gives
/// tests a clean slate.
#[derive(Default)]
pub struct CacheContext {
    caches: RwLock<HashMap<String, AnyCache>>,
}

impl CacheContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lazily created process-wide context.
    pub fn global() -> &'static CacheContext {
        static GLOBAL: OnceLock<CacheContext> = OnceLock::new();
        GLOBAL.get_or_init(CacheContext::new)
    }

    /// The cache registered under `name`, creating it with `init` on first use.
    ///
    /// Fails if `name` is registered with a different value type, or if `init`
    /// fails.
    pub fn get_or_init<T, F>(&self, name: &str, init: F) -> Result<LiveCache<T>>
    where
        T: Clone + Default + Send + Sync + 'static,
        F: FnOnce() -> Result<LiveCache<T>>,
    {
        if let Some(cache) = self.get::<T>(name)? {
            return Ok(cache);
        }

        let mut caches = self.caches.write();
        // Another thread may have won the race.
        if let Some(existing) = caches.get(name) {
            return downcast(name, existing);
        }

        let cache = init()?;
        caches.insert(name.to_string(), Arc::new(cache.clone()));
        debug!(name, "Cache created");
        Ok(cache)
    }

    /// The cache registered under `name`, if any.
    pub fn get<T>(&self, name: &str) -> Result<Option<LiveCache<T>>>
    where
        T: Clone + Default + Send + Sync + 'static,
    {
        self.caches
            .read()
            .get(name)
            .map(|cache| downcast(name, cache))
            .transpose()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.caches.read().contains_key(name)
    }

    /// Forget every registered cache. Bindings still holding a cache keep it
    /// alive until they detach.
    pub fn reset(&self) {
        let mut caches = self.caches.write();
        debug!(count = caches.len(), "Cache context reset");
        caches.clear();
    }
}

fn downcast<T>(name: &str, cache: &AnyCache) -> Result<LiveCache<T>>
where
    T: Clone + Default + Send + Sync + 'static,
{
    cache
        .downcast_ref::<LiveCache<T>>()
        .cloned()
        .ok_or_else(|| CacheError::TypeMismatch {
            name: name.to_string(),
        })
}
