//! Per-key resource state and listener notification.

use crate::error::panic_message;
use crate::subscriptions::{Listener, ListenerTable};
use crate::types::{ErrorInfo, FetchSeq, ResourceKey, ResourceState, Timestamp};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::retention::IdleKeys;

/// Mutable bookkeeping behind one key.
struct SlotState<T> {
    public: ResourceState<T>,
    /// Last sequence handed out by `begin_fetch`.
    issued: FetchSeq,
    /// Last sequence whose result was applied.
    applied: FetchSeq,
    /// Failures since the last successful fetch.
    failures: u32,
    updated_at: Option<Timestamp>,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    /// Serializes mutation + fan-out for the key. Re-entrant so listeners may
    /// call back into the cache for the same key.
    delivery: ReentrantMutex<()>,
}

impl<T: Default> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                public: ResourceState::default(),
                issued: FetchSeq(0),
                applied: FetchSeq(0),
                failures: 0,
                updated_at: None,
            }),
            delivery: ReentrantMutex::new(()),
        }
    }
}

/// Store counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys with cached state.
    pub keys: usize,
    /// Keys currently tracked as idle.
    pub idle_keys: usize,
    /// Results dropped because a newer fetch was already applied.
    pub stale_discarded: u64,
    /// Idle keys whose state was dropped.
    pub evicted: u64,
    /// Listener calls that panicked.
    pub listener_panics: u64,
}

/// Single source of truth for `ResourceState<T>` per key.
///
/// Every mutation notifies the key's listeners synchronously, in subscription
/// order, before returning. The store performs no I/O. Writes are crate-private
/// and come from the refresh scheduler only; consumers read through [`get`].
///
/// [`get`]: ResourceStore::get
pub struct ResourceStore<T> {
    slots: RwLock<HashMap<ResourceKey, Arc<Slot<T>>>>,
    listeners: Arc<ListenerTable<T>>,
    idle: Mutex<IdleKeys>,
    stale_discarded: AtomicU64,
    evicted: AtomicU64,
    listener_panics: AtomicU64,
}

impl<T> ResourceStore<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Create a store with its own listener table.
    pub fn new(idle_capacity: usize) -> Self {
        Self::with_listeners(Arc::new(ListenerTable::new()), idle_capacity)
    }

    pub(crate) fn with_listeners(listeners: Arc<ListenerTable<T>>, idle_capacity: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            listeners,
            idle: Mutex::new(IdleKeys::new(idle_capacity)),
            stale_discarded: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            listener_panics: AtomicU64::new(0),
        }
    }

    pub(crate) fn listeners(&self) -> &Arc<ListenerTable<T>> {
        &self.listeners
    }

    /// Current cached state, or the empty default for an unseen key.
    pub fn get(&self, key: &ResourceKey) -> ResourceState<T> {
        match self.slots.read().get(key) {
            Some(slot) => slot.state.lock().public.clone(),
            None => ResourceState::default(),
        }
    }

    /// Whether the key has cached state.
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.slots.read().contains_key(key)
    }

    /// Time of the last applied result (success or failure).
    pub fn updated_at(&self, key: &ResourceKey) -> Option<Timestamp> {
        self.slots
            .read()
            .get(key)
            .and_then(|slot| slot.state.lock().updated_at)
    }

    /// Failures recorded since the last successful fetch.
    pub fn consecutive_failures(&self, key: &ResourceKey) -> u32 {
        self.slots
            .read()
            .get(key)
            .map_or(0, |slot| slot.state.lock().failures)
    }

    /// Start a fetch unless one is already outstanding for `key` or
    /// `proceed` says otherwise. Sets `loading`, clears `error`, keeps `value`.
    ///
    /// `proceed` runs inside the same critical section as the in-flight
    /// check. Returns the sequence number the result must be applied with.
    pub(crate) fn begin_fetch(
        &self,
        key: &ResourceKey,
        proceed: impl FnOnce() -> bool,
    ) -> Option<FetchSeq> {
        self.mutate(key, |state| {
            if state.public.loading || !proceed() {
                return None;
            }
            Some(Self::begin(state))
        })
    }

    fn begin(state: &mut SlotState<T>) -> FetchSeq {
        state.issued = state.issued.next();
        state.public.loading = true;
        state.public.error = None;
        state.issued
    }

    /// Apply a successful result. Returns false if the result was discarded
    /// because a newer fetch already resolved.
    pub(crate) fn complete_fetch(&self, key: &ResourceKey, seq: FetchSeq, value: T) -> bool {
        self.mutate(key, |state| {
            if !self.accept(key, state, seq) {
                return None;
            }
            state.public.value = value;
            state.public.error = None;
            state.failures = 0;
            Some(())
        })
        .is_some()
    }

    /// Apply a failed result; `value` is left untouched. Returns false if the
    /// result was discarded.
    pub(crate) fn fail_fetch(&self, key: &ResourceKey, seq: FetchSeq, error: ErrorInfo) -> bool {
        self.mutate(key, |state| {
            if !self.accept(key, state, seq) {
                return None;
            }
            state.public.error = Some(error);
            state.failures = state.failures.saturating_add(1);
            Some(())
        })
        .is_some()
    }

    /// Sequence check shared by both outcomes. On acceptance advances
    /// `applied` and resolves `loading` unless a newer fetch is outstanding.
    fn accept(&self, key: &ResourceKey, state: &mut SlotState<T>, seq: FetchSeq) -> bool {
        if seq > state.issued {
            warn!(key = %key, seq = seq.0, issued = state.issued.0, "Result for a fetch that was never issued");
            return false;
        }
        if seq <= state.applied {
            debug!(key = %key, seq = seq.0, applied = state.applied.0, "Discarding stale fetch result");
            self.stale_discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.applied = seq;
        state.public.loading = seq < state.issued;
        state.updated_at = Some(Timestamp::now());
        true
    }

    /// Run `f` against the current state with delivery for `key` held, so no
    /// notification can interleave with it.
    pub(crate) fn with_delivery<R>(
        &self,
        key: &ResourceKey,
        f: impl FnOnce(&ResourceState<T>) -> R,
    ) -> R {
        let slot = self.slot(key);
        let _delivery = slot.delivery.lock();
        let snapshot = slot.state.lock().public.clone();
        f(&snapshot)
    }

    /// Mutate one key and fan the new state out. `f` returning `None` means
    /// nothing changed and nobody is notified.
    fn mutate<R>(
        &self,
        key: &ResourceKey,
        f: impl FnOnce(&mut SlotState<T>) -> Option<R>,
    ) -> Option<R> {
        let slot = self.slot(key);
        let _delivery = slot.delivery.lock();

        let (result, snapshot) = {
            let mut state = slot.state.lock();
            let result = f(&mut state)?;
            (result, state.public.clone())
        };

        self.notify(key, &snapshot);
        Some(result)
    }

    fn notify(&self, key: &ResourceKey, state: &ResourceState<T>) {
        let listeners = self.listeners.snapshot(key);
        trace!(key = %key, listeners = listeners.len(), loading = state.loading, "Fan-out");
        for listener in &listeners {
            self.deliver(key, listener, state);
        }
    }

    /// Call one listener. A panicking listener is logged and skipped; the
    /// rest of the fan-out continues.
    pub(crate) fn deliver(
        &self,
        key: &ResourceKey,
        listener: &Listener<T>,
        state: &ResourceState<T>,
    ) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(state))) {
            self.listener_panics.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, panic = %panic_message(payload.as_ref()), "Listener panicked");
        }
    }

    fn slot(&self, key: &ResourceKey) -> Arc<Slot<T>> {
        if let Some(slot) = self.slots.read().get(key) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    // --- Retention ---

    /// The key gained listeners; keep its state.
    pub(crate) fn mark_active(&self, key: &ResourceKey) {
        self.idle.lock().remove(key);
    }

    /// The key lost its last listener. May evict another idle key.
    pub(crate) fn mark_idle(&self, key: &ResourceKey) {
        let evicted = self.idle.lock().push(key.clone());
        if let Some(evicted) = evicted {
            self.evict(&evicted);
        }
    }

    /// Drop an idle key's state unless it is in use again or still fetching.
    fn evict(&self, key: &ResourceKey) {
        let mut slots = self.slots.write();
        let removable = match slots.get(key) {
            // Only the map holds the slot: no mutation or delivery in progress.
            Some(slot) => {
                Arc::strong_count(slot) == 1
                    && !slot.state.lock().public.loading
                    && self.listeners.count(key) == 0
            }
            None => false,
        };

        if removable {
            slots.remove(key);
            self.evicted.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Evicted idle resource");
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.slots.read().len(),
            idle_keys: self.idle.lock().len(),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
        }
    }
}
