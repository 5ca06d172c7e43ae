//! Consumer binding: attaches one UI component to a live resource.
//!
//! A binding subscribes on [`attach`](Binding::attach), keeps the latest
//! pushed state for [`view`](Binding::view), and unsubscribes on
//! [`detach`](Binding::detach) or drop. Attach and detach are symmetric, so
//! rapid navigation churn leaves no listeners or timers behind.

use crate::cache::LiveCache;
use crate::error::Result;
use crate::scheduler::RefreshOutcome;
use crate::subscriptions::SubscriptionHandle;
use crate::types::{ErrorInfo, ResourceKey, ResourceState};
use crossbeam_channel::{bounded, Receiver, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// What a component renders: data, loading flag and last error.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceView<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<ErrorInfo>,
}

impl<T> From<ResourceState<T>> for ResourceView<T> {
    fn from(state: ResourceState<T>) -> Self {
        Self {
            data: state.value,
            loading: state.loading,
            error: state.error,
        }
    }
}

/// A component's attachment to one resource key.
pub struct Binding<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    cache: LiveCache<T>,
    key: ResourceKey,
    latest: Arc<Mutex<ResourceState<T>>>,
    handle: Option<SubscriptionHandle>,
}

impl<T> Binding<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Subscribe to `key`. `on_update` runs for every pushed state, starting
    /// with the cached one.
    pub fn attach<F>(cache: &LiveCache<T>, key: ResourceKey, on_update: F) -> Result<Self>
    where
        F: Fn(&ResourceState<T>) + Send + Sync + 'static,
    {
        let latest = Arc::new(Mutex::new(ResourceState::default()));
        let sink = latest.clone();

        let handle = cache.subscribe(&key, move |state: &ResourceState<T>| {
            *sink.lock() = state.clone();
            on_update(state);
        })?;

        Ok(Self {
            cache: cache.clone(),
            key,
            latest,
            handle: Some(handle),
        })
    }

    /// Subscribe to `key` and receive states over a bounded channel.
    ///
    /// When the buffer is full the update is dropped for the channel; `view`
    /// still reflects it.
    pub fn attach_channel(
        cache: &LiveCache<T>,
        key: ResourceKey,
        buffer_size: usize,
    ) -> Result<(Self, Receiver<ResourceState<T>>)> {
        let (sender, receiver) = bounded(buffer_size.max(1));
        let channel_key = key.clone();

        let binding = Self::attach(cache, key, move |state: &ResourceState<T>| {
            match sender.try_send(state.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!(key = %channel_key, "Binding channel full, update dropped");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        })?;

        Ok((binding, receiver))
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Latest state pushed to this binding.
    pub fn view(&self) -> ResourceView<T> {
        self.latest.lock().clone().into()
    }

    /// Ask for a fresh fetch. A no-op while one is already in flight.
    pub fn refresh(&self) -> Result<RefreshOutcome> {
        self.cache.refresh(&self.key)
    }

    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    /// Unsubscribe. Same as dropping the binding.
    pub fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cache.unsubscribe(handle);
        }
    }
}

impl<T> Drop for Binding<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.release();
    }
}
