//! Refresh scheduler: timer loops and fetch dispatch.

use crate::error::{panic_message, Result};
use crate::fetcher::Fetcher;
use crate::store::ResourceStore;
use crate::types::{ErrorInfo, ErrorKind, FetchSeq, ResourceKey};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::backoff::{next_delay, BackoffConfig};

/// Timing settings of a scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// `None` refreshes only on subscribe and on demand.
    pub interval: Option<Duration>,
    pub backoff: Option<BackoffConfig>,
    /// Prefix for spawned thread names.
    pub thread_name: String,
}

/// Result of a refresh request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A fetch was dispatched with this sequence number.
    Started(FetchSeq),
    /// A fetch for the key was already outstanding; nothing was done.
    InFlight,
    /// The owning loop was stopped before the tick ran.
    Cancelled,
}

/// Scheduler counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub fetches_started: u64,
    pub fetches_completed: u64,
    pub fetches_failed: u64,
    pub in_flight_skips: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

struct Inner<T> {
    store: Arc<ResourceStore<T>>,
    fetcher: Arc<dyn Fetcher<T>>,
    config: SchedulerConfig,
    counters: Counters,
}

/// Drives fetches for resource keys, with at most one outstanding fetch per key.
///
/// Timer ticks and manual refreshes share the store's in-flight guard, so they
/// never race into duplicate requests.
pub struct RefreshScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RefreshScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> RefreshScheduler<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<ResourceStore<T>>,
        fetcher: Arc<dyn Fetcher<T>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                config,
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Fetch `key` now unless a fetch is already outstanding.
    ///
    /// Does not block on the fetch and does not touch any timer.
    pub fn refresh_now(&self, key: &ResourceKey) -> Result<RefreshOutcome> {
        self.refresh_unless(key, None)
    }

    fn refresh_unless(
        &self,
        key: &ResourceKey,
        cancelled: Option<&AtomicBool>,
    ) -> Result<RefreshOutcome> {
        let mut was_cancelled = false;
        let seq = self.inner.store.begin_fetch(key, || {
            was_cancelled = cancelled.is_some_and(|c| c.load(Ordering::SeqCst));
            !was_cancelled
        });

        match seq {
            Some(seq) => {
                self.inner.counters.started.fetch_add(1, Ordering::Relaxed);
                self.dispatch(key.clone(), seq)?;
                Ok(RefreshOutcome::Started(seq))
            }
            None if was_cancelled => Ok(RefreshOutcome::Cancelled),
            None => {
                debug!(key = %key, "Fetch already in flight, skipping refresh");
                self.inner.counters.skipped.fetch_add(1, Ordering::Relaxed);
                Ok(RefreshOutcome::InFlight)
            }
        }
    }

    /// Run the fetcher on a worker thread and apply its result.
    fn dispatch(&self, key: ResourceKey, seq: FetchSeq) -> Result<()> {
        let inner = self.inner.clone();
        let worker_key = key.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-fetch", self.inner.config.thread_name))
            .spawn(move || inner.run_fetch(&worker_key, seq));

        if let Err(e) = spawned {
            warn!(key = %key, seq = seq.0, error = %e, "Could not spawn fetch thread");
            self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            self.inner
                .store
                .fail_fetch(&key, seq, ErrorInfo::new(ErrorKind::Spawn, e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// Fetch immediately, then arm the repeating timer if an interval is set.
    pub fn start(&self, key: &ResourceKey) -> Result<RefreshLoop> {
        self.refresh_now(key)?;

        let Some(interval) = self.inner.config.interval else {
            debug!(key = %key, "On-demand resource, no timer armed");
            return Ok(RefreshLoop::untimed(key.clone()));
        };

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let cancelled = Arc::new(AtomicBool::new(false));

        let scheduler = self.clone();
        let loop_key = key.clone();
        let loop_cancelled = cancelled.clone();
        thread::Builder::new()
            .name(format!("{}-loop", self.inner.config.thread_name))
            .spawn(move || scheduler.run_loop(&loop_key, interval, &stop_rx, &loop_cancelled))?;

        debug!(key = %key, ?interval, "Refresh loop started");
        Ok(RefreshLoop {
            key: key.clone(),
            stop: Some(stop_tx),
            cancelled,
        })
    }

    fn run_loop(
        &self,
        key: &ResourceKey,
        interval: Duration,
        stop: &Receiver<()>,
        cancelled: &AtomicBool,
    ) {
        loop {
            let failures = self.inner.store.consecutive_failures(key);
            let delay = next_delay(interval, self.inner.config.backoff.as_ref(), failures);

            select! {
                recv(stop) -> _ => break,
                default(delay) => {
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    match self.refresh_unless(key, Some(cancelled)) {
                        Ok(RefreshOutcome::Cancelled) => break,
                        Ok(_) => {}
                        // Already recorded in the store; the next tick retries.
                        Err(e) => warn!(key = %key, error = %e, "Scheduled refresh failed"),
                    }
                }
            }
        }
        debug!(key = %key, "Refresh loop exited");
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.inner.counters;
        SchedulerStats {
            fetches_started: c.started.load(Ordering::Relaxed),
            fetches_completed: c.completed.load(Ordering::Relaxed),
            fetches_failed: c.failed.load(Ordering::Relaxed),
            in_flight_skips: c.skipped.load(Ordering::Relaxed),
        }
    }
}

impl<T> Inner<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn run_fetch(&self, key: &ResourceKey, seq: FetchSeq) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch(key)));

        match outcome {
            Ok(Ok(value)) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                self.store.complete_fetch(key, seq, value);
            }
            Ok(Err(e)) => {
                warn!(key = %key, seq = seq.0, error = %e, "Fetch failed");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.store.fail_fetch(key, seq, e.into());
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(key = %key, seq = seq.0, panic = %message, "Fetcher panicked");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.store
                    .fail_fetch(key, seq, ErrorInfo::new(ErrorKind::Panicked, message));
            }
        }
    }
}

/// Background refresh of one key. Dropping it stops the timer; a fetch
/// already in flight still completes and updates the store.
pub struct RefreshLoop {
    key: ResourceKey,
    stop: Option<Sender<()>>,
    cancelled: Arc<AtomicBool>,
}

impl RefreshLoop {
    fn untimed(key: ResourceKey) -> Self {
        Self {
            key,
            stop: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Whether a timer thread backs this loop.
    pub fn is_timed(&self) -> bool {
        self.stop.is_some()
    }

    /// Stop the timer. Same as dropping the loop.
    pub fn stop(self) {}
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Disconnecting wakes the loop thread.
        self.stop.take();
        debug!(key = %self.key, "Refresh loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crossbeam_channel::unbounded;
    use std::time::Instant;

    fn scheduler<F>(fetcher: F, interval: Option<Duration>) -> RefreshScheduler<Vec<u32>>
    where
        F: Fn(&ResourceKey) -> std::result::Result<Vec<u32>, FetchError> + Send + Sync + 'static,
    {
        RefreshScheduler::new(
            Arc::new(ResourceStore::new(0)),
            Arc::new(fetcher),
            SchedulerConfig {
                interval,
                backoff: None,
                thread_name: "test".into(),
            },
        )
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_refresh_applies_result() {
        let s = scheduler(|_| Ok(vec![1, 2]), None);
        let key = ResourceKey::new("calls");

        assert_eq!(s.refresh_now(&key).unwrap(), RefreshOutcome::Started(FetchSeq(1)));
        wait_until(|| !s.inner.store.get(&key).loading);
        assert_eq!(s.inner.store.get(&key).value, vec![1, 2]);
        assert_eq!(s.stats().fetches_completed, 1);
    }

    #[test]
    fn test_concurrent_refresh_single_fetch() {
        let (release_tx, release_rx) = unbounded::<()>();
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let s = scheduler(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = release_rx.recv();
                Ok(vec![])
            },
            None,
        );
        let key = ResourceKey::new("calls");

        assert!(matches!(s.refresh_now(&key).unwrap(), RefreshOutcome::Started(_)));
        for _ in 0..10 {
            assert_eq!(s.refresh_now(&key).unwrap(), RefreshOutcome::InFlight);
        }

        release_tx.send(()).unwrap();
        wait_until(|| !s.inner.store.get(&key).loading);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.stats().in_flight_skips, 10);
    }

    #[test]
    fn test_panicking_fetcher_resolves_loading() {
        let s = scheduler(|_| panic!("boom"), None);
        let key = ResourceKey::new("calls");

        s.refresh_now(&key).unwrap();
        wait_until(|| !s.inner.store.get(&key).loading);

        let error = s.inner.store.get(&key).error.unwrap();
        assert_eq!(error.kind, ErrorKind::Panicked);
        assert_eq!(error.message, "boom");
    }

    #[test]
    fn test_timer_ticks_until_dropped() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let s = scheduler(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            },
            Some(Duration::from_millis(10)),
        );
        let key = ResourceKey::new("calls");

        let refresh_loop = s.start(&key).unwrap();
        assert!(refresh_loop.is_timed());
        wait_until(|| calls.load(Ordering::SeqCst) >= 3);

        refresh_loop.stop();
        wait_until(|| !s.inner.store.get(&key).loading);
        let settled = calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(calls.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn test_untimed_start_fetches_once() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let s = scheduler(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            },
            None,
        );
        let key = ResourceKey::new("leads:1");

        let refresh_loop = s.start(&key).unwrap();
        assert!(!refresh_loop.is_timed());
        wait_until(|| !s.inner.store.get(&key).loading);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
