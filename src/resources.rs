//! Resource kinds used by the campaign dashboard.
//!
//! All kinds share one pattern: a single cache per kind, shared listeners,
//! one fetch per refresh cycle. They differ only in key shape and timing.

use crate::cache::{CacheConfig, LiveCache};
use crate::context::CacheContext;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::types::ResourceKey;
use std::time::Duration;

/// Context name of the active-call cache.
pub const ACTIVE_CALLS: &str = "active-calls";
/// Context name and key prefix of per-campaign lead caches.
pub const CAMPAIGN_LEADS: &str = "leads";
/// Context name and key prefix of call-session caches.
pub const CALL_SESSIONS: &str = "sessions";

/// Interval of the active-call monitor.
pub const ACTIVE_CALLS_INTERVAL: Duration = Duration::from_secs(10);

/// The global list of calls in progress.
pub fn active_calls_key() -> ResourceKey {
    ResourceKey::new(ACTIVE_CALLS)
}

/// Leads of one campaign.
pub fn campaign_leads_key(campaign_id: &str) -> ResourceKey {
    ResourceKey::with_param(CAMPAIGN_LEADS, campaign_id)
}

/// Call sessions of the current user, optionally filtered by session type.
pub fn call_sessions_key(session_type: Option<&str>) -> ResourceKey {
    match session_type {
        Some(t) => ResourceKey::with_param(CALL_SESSIONS, t),
        None => ResourceKey::new(CALL_SESSIONS),
    }
}

pub fn active_calls_config() -> CacheConfig {
    CacheConfig {
        refresh_interval: Some(ACTIVE_CALLS_INTERVAL),
        thread_name: ACTIVE_CALLS.to_string(),
        ..Default::default()
    }
}

/// Leads are fetched on subscribe and on demand.
pub fn campaign_leads_config() -> CacheConfig {
    CacheConfig {
        thread_name: CAMPAIGN_LEADS.to_string(),
        ..CacheConfig::on_demand()
    }
}

pub fn call_sessions_config() -> CacheConfig {
    CacheConfig {
        thread_name: CALL_SESSIONS.to_string(),
        ..CacheConfig::on_demand()
    }
}

/// The shared active-call cache of `ctx`, created with `fetcher` on first use.
pub fn active_calls<T, F>(ctx: &CacheContext, fetcher: F) -> Result<LiveCache<T>>
where
    T: Clone + Default + Send + Sync + 'static,
    F: Fetcher<T>,
{
    ctx.get_or_init(ACTIVE_CALLS, || LiveCache::new(fetcher, active_calls_config()))
}

/// The shared campaign-lead cache of `ctx`.
pub fn campaign_leads<T, F>(ctx: &CacheContext, fetcher: F) -> Result<LiveCache<T>>
where
    T: Clone + Default + Send + Sync + 'static,
    F: Fetcher<T>,
{
    ctx.get_or_init(CAMPAIGN_LEADS, || {
        LiveCache::new(fetcher, campaign_leads_config())
    })
}

/// The shared call-session cache of `ctx`.
pub fn call_sessions<T, F>(ctx: &CacheContext, fetcher: F) -> Result<LiveCache<T>>
where
    T: Clone + Default + Send + Sync + 'static,
    F: Fetcher<T>,
{
    ctx.get_or_init(CALL_SESSIONS, || {
        LiveCache::new(fetcher, call_sessions_config())
    })
}
