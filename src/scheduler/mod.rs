//! Refresh scheduling.
//!
//! A [`RefreshScheduler`] owns fetch dispatch for a store: each fetch runs on
//! its own worker thread and lands in the store tagged with its sequence
//! number. A [`RefreshLoop`] is the per-key timer; it fetches once on start,
//! then on every tick until dropped. Failed fetches are only retried by the
//! next tick, optionally spaced out by [`BackoffConfig`].

mod backoff;
mod refresh;

pub use backoff::{next_delay, BackoffConfig};
pub use refresh::{RefreshLoop, RefreshOutcome, RefreshScheduler, SchedulerConfig, SchedulerStats};
