//! Append-only listener lists, one per resource key.

use crate::types::ResourceKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{Listener, ListenerId};

/// Listener lists shared by the store (delivery) and the registry (membership).
///
/// Entries are appended in subscription order and removed only by id.
pub(crate) struct ListenerTable<T> {
    keys: RwLock<HashMap<ResourceKey, Vec<(ListenerId, Listener<T>)>>>,
    next_id: AtomicU64,
}

impl<T> ListenerTable<T> {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a listener. Returns its id and the key's listener count afterwards.
    pub fn insert(&self, key: &ResourceKey, listener: Listener<T>) -> (ListenerId, usize) {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut keys = self.keys.write();
        let list = keys.entry(key.clone()).or_default();
        list.push((id, listener));
        (id, list.len())
    }

    /// Remove a listener by id. Returns the remaining count, or `None` if the
    /// id was not registered under `key`.
    pub fn remove(&self, key: &ResourceKey, id: ListenerId) -> Option<usize> {
        let mut keys = self.keys.write();
        let list = keys.get_mut(key)?;
        let pos = list.iter().position(|(lid, _)| *lid == id)?;
        list.remove(pos);

        let remaining = list.len();
        if remaining == 0 {
            keys.remove(key);
        }
        Some(remaining)
    }

    /// Listeners of `key` in subscription order, detached from the lock.
    pub fn snapshot(&self, key: &ResourceKey) -> Vec<Listener<T>> {
        self.keys
            .read()
            .get(key)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, key: &ResourceKey) -> usize {
        self.keys.read().get(key).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.keys.read().values().map(Vec::len).sum()
    }

    pub fn active_keys(&self) -> usize {
        self.keys.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResourceState;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording(log: &Arc<Mutex<Vec<u32>>>, tag: u32) -> Listener<u32> {
        let log = log.clone();
        Arc::new(move |_: &ResourceState<u32>| log.lock().push(tag))
    }

    #[test]
    fn test_snapshot_keeps_subscription_order() {
        let table = ListenerTable::new();
        let key = ResourceKey::new("k");
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in [3, 1, 2] {
            table.insert(&key, recording(&log, tag));
        }

        let state = ResourceState::default();
        for l in table.snapshot(&key) {
            l(&state);
        }
        assert_eq!(*log.lock(), vec![3, 1, 2]);
    }

    #[test]
    fn test_remove_by_id_only_once() {
        let table: ListenerTable<u32> = ListenerTable::new();
        let key = ResourceKey::new("k");
        let log = Arc::new(Mutex::new(Vec::new()));

        let (a, _) = table.insert(&key, recording(&log, 1));
        let (_, count) = table.insert(&key, recording(&log, 2));
        assert_eq!(count, 2);

        assert_eq!(table.remove(&key, a), Some(1));
        assert_eq!(table.remove(&key, a), None);
        assert_eq!(table.count(&key), 1);
    }

    #[test]
    fn test_last_removal_drops_key() {
        let table: ListenerTable<u32> = ListenerTable::new();
        let key = ResourceKey::new("k");
        let log = Arc::new(Mutex::new(Vec::new()));

        let (id, _) = table.insert(&key, recording(&log, 1));
        assert_eq!(table.active_keys(), 1);
        assert_eq!(table.remove(&key, id), Some(0));
        assert_eq!(table.active_keys(), 0);
        assert_eq!(table.total(), 0);
    }
}
