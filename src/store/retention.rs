//! Bounded retention of keys that have no listeners.

use crate::types::ResourceKey;
use lru::LruCache;
use std::num::NonZeroUsize;

/// LRU of idle keys. A capacity of zero retains every key forever.
pub(crate) struct IdleKeys {
    lru: Option<LruCache<ResourceKey, ()>>,
}

impl IdleKeys {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: NonZeroUsize::new(capacity).map(LruCache::new),
        }
    }

    /// Record `key` as idle. Returns the key pushed out of the LRU, if any.
    pub fn push(&mut self, key: ResourceKey) -> Option<ResourceKey> {
        let lru = self.lru.as_mut()?;
        match lru.push(key.clone(), ()) {
            Some((evicted, ())) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    /// Forget `key`; it has listeners again.
    pub fn remove(&mut self, key: &ResourceKey) {
        if let Some(lru) = self.lru.as_mut() {
            lru.pop(key);
        }
    }

    pub fn len(&self) -> usize {
        self.lru.as_ref().map_or(0, LruCache::len)
    }
}
