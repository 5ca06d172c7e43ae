//! # Live Cache
//!
//! A shared cache for remotely sourced, frequently changing resources. Many
//! independent consumers can watch the same resource; it is fetched at most
//! once per refresh cycle and every update is pushed to all of them.
//!
//! ## Core Concepts
//!
//! - **Store**: per-key `{ value, loading, error }` with stale-while-revalidate
//! - **Subscriptions**: listeners per key; the first starts a refresh loop, the last stops it
//! - **Scheduler**: timer and manual refreshes behind one in-flight guard
//! - **Bindings**: attach/detach a consumer and read `{ data, loading, error }`
//!
//! ## Example
//!
//! ```ignore
//! use live_cache::{resources, Binding, CacheContext};
//!
//! let ctx = CacheContext::new();
//! let calls = resources::active_calls(&ctx, |_key: &ResourceKey| api.active_calls())?;
//!
//! let monitor = Binding::attach(&calls, resources::active_calls_key(), |state| {
//!     render(&state.value, state.loading, state.error.as_ref());
//! })?;
//!
//! // User pressed "refresh"
//! monitor.refresh()?;
//!
//! // Component unmounted
//! monitor.detach();
//! ```

pub mod binding;
pub mod cache;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod resources;
pub mod scheduler;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use binding::{Binding, ResourceView};
pub use cache::{CacheConfig, CacheStats, LiveCache};
pub use context::CacheContext;
pub use error::{CacheError, FetchError, Result};
pub use fetcher::{Fetcher, JsonFetcher, Response, Transport};
pub use scheduler::{
    BackoffConfig, RefreshLoop, RefreshOutcome, RefreshScheduler, SchedulerConfig, SchedulerStats,
};
pub use store::{ResourceStore, StoreStats};
pub use subscriptions::{Listener, ListenerId, SubscriptionHandle, SubscriptionRegistry};
pub use types::*;
