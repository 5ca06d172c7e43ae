//! Subscription registry: listener membership and refresh loop lifecycle.

use crate::error::Result;
use crate::scheduler::{RefreshLoop, RefreshScheduler};
use crate::store::ResourceStore;
use crate::types::ResourceKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::listeners::ListenerTable;
use super::types::{Listener, SubscriptionHandle};

/// Tracks listeners per key and runs one refresh loop per key with listeners.
///
/// The loop starts when a key's listener count goes from 0 to 1 and stops when
/// it drops back to 0. Cached state outlives the loop.
pub struct SubscriptionRegistry<T> {
    store: Arc<ResourceStore<T>>,
    scheduler: RefreshScheduler<T>,
    loops: Mutex<HashMap<ResourceKey, RefreshLoop>>,
}

impl<T> SubscriptionRegistry<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new(store: Arc<ResourceStore<T>>, scheduler: RefreshScheduler<T>) -> Self {
        Self {
            store,
            scheduler,
            loops: Mutex::new(HashMap::new()),
        }
    }

    fn listeners(&self) -> &ListenerTable<T> {
        self.store.listeners()
    }

    /// Register `listener` for `key`.
    ///
    /// The listener is immediately handed the current cached state. The first
    /// listener of a key starts its refresh loop, which fetches right away.
    pub fn subscribe(&self, key: &ResourceKey, listener: Listener<T>) -> Result<SubscriptionHandle> {
        self.store.mark_active(key);

        self.store.with_delivery(key, |current| {
            let (id, count) = self.listeners().insert(key, listener.clone());
            debug!(key = %key, listener = id.0, count, "Subscribed");

            self.store.deliver(key, &listener, current);

            if count == 1 {
                if let Err(e) = self.start_loop(key) {
                    self.listeners().remove(key, id);
                    return Err(e);
                }
            }
            Ok(SubscriptionHandle {
                id,
                key: key.clone(),
            })
        })
    }

    /// Remove a registration. The last listener of a key stops its loop.
    ///
    /// Returns false if the handle was no longer registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let SubscriptionHandle { id, key } = handle;

        self.store.with_delivery(&key, |_| {
            let Some(remaining) = self.listeners().remove(&key, id) else {
                return false;
            };
            debug!(key = %key, listener = id.0, remaining, "Unsubscribed");

            if remaining == 0 {
                self.loops.lock().remove(&key);
                self.store.mark_idle(&key);
            }
            true
        })
    }

    /// Runs with the key's delivery held. `loops` stays unlocked while
    /// starting: the first fetch notifies listeners, which may re-enter.
    fn start_loop(&self, key: &ResourceKey) -> Result<()> {
        if self.is_running(key) {
            return Ok(());
        }
        let refresh_loop = self.scheduler.start(key)?;

        // A listener may have unsubscribed during that first notification.
        if self.listener_count(key) > 0 {
            self.loops.lock().insert(key.clone(), refresh_loop);
        }
        Ok(())
    }

    /// Whether a refresh loop is registered for `key`.
    pub fn is_running(&self, key: &ResourceKey) -> bool {
        self.loops.lock().contains_key(key)
    }

    pub fn listener_count(&self, key: &ResourceKey) -> usize {
        self.listeners().count(key)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners().total()
    }

    pub fn active_keys(&self) -> usize {
        self.listeners().active_keys()
    }
}
