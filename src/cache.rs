//! Live cache tying the store, subscription registry and scheduler together.

use crate::error::{CacheError, Result};
use crate::fetcher::Fetcher;
use crate::scheduler::{BackoffConfig, RefreshOutcome, RefreshScheduler, SchedulerConfig};
use crate::store::ResourceStore;
use crate::subscriptions::{ListenerTable, SubscriptionHandle, SubscriptionRegistry};
use crate::types::{ResourceKey, ResourceState, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Cache configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Timer interval. `None` fetches on first subscribe and on `refresh` only.
    /// Default: 10s
    pub refresh_interval: Option<Duration>,

    /// Backoff after consecutive failures (None = fixed interval).
    pub backoff: Option<BackoffConfig>,

    /// Idle keys retained after their last listener leaves (0 = unbounded).
    /// Default: 64
    pub idle_capacity: usize,

    /// Prefix for worker thread names.
    pub thread_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Some(Duration::from_secs(10)),
            backoff: None,
            idle_capacity: 64,
            thread_name: "live-cache".to_string(),
        }
    }
}

impl CacheConfig {
    /// On-demand configuration: no timer.
    pub fn on_demand() -> Self {
        Self {
            refresh_interval: None,
            ..Default::default()
        }
    }

    /// Parse a JSON configuration document. Missing fields take defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(interval) = self.refresh_interval {
            if interval.is_zero() {
                return Err(CacheError::InvalidConfig(
                    "refresh_interval must be non-zero".into(),
                ));
            }
            if let Some(backoff) = &self.backoff {
                if backoff.max_interval < interval {
                    return Err(CacheError::InvalidConfig(format!(
                        "backoff max_interval {:?} is below refresh_interval {:?}",
                        backoff.max_interval, interval
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Point-in-time cache counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Keys with cached state.
    pub keys: usize,
    /// Keys with at least one listener.
    pub active_keys: usize,
    pub listeners: usize,
    pub fetches_started: u64,
    pub fetches_completed: u64,
    pub fetches_failed: u64,
    pub stale_discarded: u64,
    pub in_flight_skips: u64,
    pub evicted: u64,
    pub listener_panics: u64,
}

struct Inner<T> {
    config: CacheConfig,
    store: Arc<ResourceStore<T>>,
    scheduler: RefreshScheduler<T>,
    registry: SubscriptionRegistry<T>,
}

/// Shared, self-refreshing cache for one kind of resource.
///
/// Cloning is cheap; clones share state. Consumers normally attach through a
/// [`Binding`](crate::Binding) rather than calling `subscribe` directly.
pub struct LiveCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for LiveCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> LiveCache<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new(fetcher: impl Fetcher<T>, config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let listeners = Arc::new(ListenerTable::new());
        let store = Arc::new(ResourceStore::with_listeners(listeners, config.idle_capacity));
        let scheduler = RefreshScheduler::new(
            store.clone(),
            Arc::new(fetcher),
            SchedulerConfig {
                interval: config.refresh_interval,
                backoff: config.backoff,
                thread_name: config.thread_name.clone(),
            },
        );
        let registry = SubscriptionRegistry::new(store.clone(), scheduler.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                store,
                scheduler,
                registry,
            }),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Register a listener for `key`. See [`SubscriptionRegistry::subscribe`].
    pub fn subscribe<F>(&self, key: &ResourceKey, listener: F) -> Result<SubscriptionHandle>
    where
        F: Fn(&ResourceState<T>) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(key, Arc::new(listener))
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner.registry.unsubscribe(handle)
    }

    /// Fetch `key` now unless a fetch is already outstanding.
    pub fn refresh(&self, key: &ResourceKey) -> Result<RefreshOutcome> {
        self.inner.scheduler.refresh_now(key)
    }

    /// Current cached state of `key`.
    pub fn get(&self, key: &ResourceKey) -> ResourceState<T> {
        self.inner.store.get(key)
    }

    /// Whether `key` has cached state. False once an idle key is evicted.
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.inner.store.contains(key)
    }

    /// Time the last result for `key` was applied.
    pub fn updated_at(&self, key: &ResourceKey) -> Option<Timestamp> {
        self.inner.store.updated_at(key)
    }

    pub fn is_running(&self, key: &ResourceKey) -> bool {
        self.inner.registry.is_running(key)
    }

    pub fn listener_count(&self, key: &ResourceKey) -> usize {
        self.inner.registry.listener_count(key)
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.inner.store.stats();
        let scheduler = self.inner.scheduler.stats();
        CacheStats {
            keys: store.keys,
            active_keys: self.inner.registry.active_keys(),
            listeners: self.inner.registry.total_listeners(),
            fetches_started: scheduler.fetches_started,
            fetches_completed: scheduler.fetches_completed,
            fetches_failed: scheduler.fetches_failed,
            stale_discarded: store.stale_discarded,
            in_flight_skips: scheduler.in_flight_skips,
            evicted: store.evicted,
            listener_panics: store.listener_panics,
        }
    }
}
