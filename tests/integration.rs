//! Integration tests for shared live resources.

use crossbeam_channel::{unbounded, Receiver, Sender};
use live_cache::{
    resources, Binding, CacheConfig, CacheContext, FetchError, LiveCache, RefreshOutcome,
    ResourceKey,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Fetcher answering from a queue of scripted responses.
struct Scripted {
    calls: Arc<AtomicUsize>,
    responses: Sender<Vec<String>>,
}

impl Scripted {
    fn new() -> (Self, Receiver<Vec<String>>) {
        let (tx, rx) = unbounded();
        (
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                responses: tx,
            },
            rx,
        )
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, calls: &[&str]) {
        self.responses
            .send(calls.iter().map(|c| c.to_string()).collect())
            .unwrap();
    }

    fn cache(&self, rx: Receiver<Vec<String>>, config: CacheConfig) -> LiveCache<Vec<String>> {
        let calls = self.calls.clone();
        LiveCache::new(
            move |_: &ResourceKey| {
                calls.fetch_add(1, Ordering::SeqCst);
                rx.recv_timeout(Duration::from_secs(5))
                    .map_err(|e| FetchError::Transport(e.to_string()))
            },
            config,
        )
        .unwrap()
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(2));
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn settled(cache: &LiveCache<Vec<String>>, key: &ResourceKey) -> bool {
    !cache.get(key).loading
}

// --- Monitoring Scenario ---

#[test]
fn test_active_call_monitor_scenario() {
    init_tracing();
    let (script, rx) = Scripted::new();
    let cache = script.cache(
        rx,
        CacheConfig {
            refresh_interval: Some(Duration::from_millis(500)),
            ..Default::default()
        },
    );
    let key = resources::active_calls_key();

    // Component A mounts: one fetch fires immediately.
    script.respond(&["call1"]);
    let a = Binding::attach(&cache, key.clone(), |_| {}).unwrap();
    wait_until(|| a.view().data == vec!["call1".to_string()]);
    assert_eq!(script.calls(), 1);

    // Component B mounts: cache reused, no new fetch.
    let b = Binding::attach(&cache, key.clone(), |_| {}).unwrap();
    assert_eq!(b.view().data, vec!["call1".to_string()]);
    assert_eq!(script.calls(), 1);

    // Timer tick: both see the new list.
    script.respond(&["call1", "call2"]);
    wait_until(|| a.view().data.len() == 2 && b.view().data.len() == 2);
    assert_eq!(script.calls(), 2);

    // Both unmount: timer cancelled, no further fetches.
    a.detach();
    assert!(cache.is_running(&key));
    b.detach();
    assert!(!cache.is_running(&key));

    wait_until(|| settled(&cache, &key));
    let calls = script.calls();
    thread::sleep(Duration::from_millis(1200));
    assert_eq!(script.calls(), calls);
}

// --- Subscription Lifecycle ---

#[test]
fn test_subscribe_unsubscribe_symmetry() {
    init_tracing();
    let (script, rx) = Scripted::new();
    let cache = script.cache(rx, CacheConfig::default());
    let key = ResourceKey::new("active-calls");

    script.respond(&["c1"]);
    let handle = cache.subscribe(&key, |_| {}).unwrap();
    assert!(cache.unsubscribe(handle));

    assert_eq!(cache.listener_count(&key), 0);
    assert!(!cache.is_running(&key));

    // Re-subscribing restarts the loop and fetches again.
    wait_until(|| settled(&cache, &key));
    script.respond(&["c2"]);
    let handle = cache.subscribe(&key, |_| {}).unwrap();
    assert!(cache.is_running(&key));
    wait_until(|| cache.get(&key).value == vec!["c2".to_string()]);
    assert_eq!(script.calls(), 2);

    cache.unsubscribe(handle);
}

#[test]
fn test_resubscribe_serves_stale_value_immediately() {
    let (script, rx) = Scripted::new();
    let cache = script.cache(rx, CacheConfig::on_demand());
    let key = resources::campaign_leads_key("c-1");

    script.respond(&["lead-a"]);
    let first = Binding::attach(&cache, key.clone(), |_| {}).unwrap();
    wait_until(|| !first.view().data.is_empty());
    first.detach();

    // The refetch is held back; the binding still starts from cached data.
    let second = Binding::attach(&cache, key.clone(), |_| {}).unwrap();
    let view = second.view();
    assert_eq!(view.data, vec!["lead-a".to_string()]);
    assert!(view.loading);

    script.respond(&["lead-a", "lead-b"]);
    wait_until(|| second.view().data.len() == 2);
}

#[test]
fn test_keys_do_not_share_state() {
    let cache = LiveCache::<Vec<String>>::new(
        |key: &ResourceKey| Ok::<_, FetchError>(vec![key.to_string()]),
        CacheConfig::on_demand(),
    )
    .unwrap();

    let one = Binding::attach(&cache, resources::campaign_leads_key("1"), |_| {}).unwrap();
    let two = Binding::attach(&cache, resources::campaign_leads_key("2"), |_| {}).unwrap();

    wait_until(|| !one.view().data.is_empty() && !two.view().data.is_empty());
    assert_eq!(one.view().data, vec!["leads:1".to_string()]);
    assert_eq!(two.view().data, vec!["leads:2".to_string()]);
}

// --- Refresh ---

#[test]
fn test_manual_refresh_shares_in_flight_guard() {
    let (script, rx) = Scripted::new();
    let cache = script.cache(rx, CacheConfig::default());
    let key = resources::active_calls_key();

    let binding = Binding::attach(&cache, key.clone(), |_| {}).unwrap();
    wait_until(|| script.calls() == 1);

    // First fetch is still waiting for its response.
    for _ in 0..5 {
        assert_eq!(binding.refresh().unwrap(), RefreshOutcome::InFlight);
    }

    script.respond(&["c1"]);
    wait_until(|| settled(&cache, &key));
    assert_eq!(script.calls(), 1);
    assert_eq!(cache.stats().in_flight_skips, 5);

    script.respond(&["c1", "c2"]);
    assert!(matches!(binding.refresh().unwrap(), RefreshOutcome::Started(_)));
    wait_until(|| binding.view().data.len() == 2);
}

#[test]
fn test_concurrent_refresh_calls_one_fetch() {
    let (script, rx) = Scripted::new();
    let cache = script.cache(rx, CacheConfig::on_demand());
    let key = ResourceKey::new("sessions");

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let key = key.clone();
            thread::spawn(move || cache.refresh(&key).unwrap())
        })
        .collect();

    let outcomes: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    let started = outcomes
        .iter()
        .filter(|o| matches!(o, RefreshOutcome::Started(_)))
        .count();
    assert_eq!(started, 1);

    script.respond(&["s1"]);
    wait_until(|| settled(&cache, &key));
    assert_eq!(script.calls(), 1);
}

#[test]
fn test_late_result_after_unsubscribe_still_cached() {
    let (script, rx) = Scripted::new();
    let cache = script.cache(rx, CacheConfig::default());
    let key = resources::active_calls_key();

    let binding = Binding::attach(&cache, key.clone(), |_| {}).unwrap();
    wait_until(|| script.calls() == 1);
    binding.detach();

    script.respond(&["late"]);
    wait_until(|| settled(&cache, &key));
    assert_eq!(cache.get(&key).value, vec!["late".to_string()]);
}

#[test]
fn test_reads_follow_refreshes() {
    let (script, rx) = Scripted::new();
    let cache = script.cache(rx, CacheConfig::on_demand());
    let key = resources::call_sessions_key(None);

    assert!(!cache.contains(&key));
    assert!(cache.updated_at(&key).is_none());

    script.respond(&["s1"]);
    let binding = Binding::attach(&cache, key.clone(), |_| {}).unwrap();
    wait_until(|| settled(&cache, &key));
    let first = cache.updated_at(&key).unwrap();

    // Reads never start or block a fetch.
    for _ in 0..3 {
        assert!(cache.contains(&key));
        assert!(!cache.get(&key).loading);
    }
    assert_eq!(script.calls(), 1);

    script.respond(&["s1", "s2"]);
    assert!(matches!(binding.refresh().unwrap(), RefreshOutcome::Started(_)));
    wait_until(|| binding.view().data.len() == 2);
    assert!(cache.updated_at(&key).unwrap() >= first);
}

// --- Retention ---

#[test]
fn test_idle_keys_evicted_beyond_capacity() {
    let cache = LiveCache::<Vec<String>>::new(
        |key: &ResourceKey| Ok::<_, FetchError>(vec![key.to_string()]),
        CacheConfig {
            idle_capacity: 1,
            ..CacheConfig::on_demand()
        },
    )
    .unwrap();

    let a = ResourceKey::new("sessions:a");
    let b = ResourceKey::new("sessions:b");

    for key in [&a, &b] {
        let binding = Binding::attach(&cache, key.clone(), |_| {}).unwrap();
        wait_until(|| !binding.view().data.is_empty());
    }

    assert!(!cache.contains(&a));
    assert!(cache.contains(&b));
    assert_eq!(cache.stats().evicted, 1);
}

// --- Context ---

#[test]
fn test_context_shares_cache_between_components() {
    let ctx = CacheContext::new();
    let fetch = |_: &ResourceKey| Ok::<_, FetchError>(vec!["call1".to_string()]);

    let monitor = resources::active_calls::<Vec<String>, _>(&ctx, fetch).unwrap();
    let sidebar = resources::active_calls::<Vec<String>, _>(&ctx, fetch).unwrap();

    let key = resources::active_calls_key();
    let a = Binding::attach(&monitor, key.clone(), |_| {}).unwrap();
    let b = Binding::attach(&sidebar, key.clone(), |_| {}).unwrap();

    assert_eq!(monitor.listener_count(&key), 2);
    wait_until(|| !a.view().data.is_empty() && !b.view().data.is_empty());
    assert_eq!(monitor.stats().fetches_started, 1);

    drop(a);
    drop(b);
    ctx.reset();
    assert!(!monitor.is_running(&key));
}
