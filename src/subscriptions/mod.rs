//! Subscriptions to live resources.
//!
//! Listeners are callbacks registered per resource key. They receive every
//! state transition of that key, synchronously and in subscription order.
//! A listener added while a notification is being delivered only sees the
//! next one.
//!
//! The registry counts listeners per key: the refresh loop for a key runs
//! exactly while the key has at least one listener.
//!
//! # Example
//!
//! ```ignore
//! let handle = registry.subscribe(&"active-calls".into(), Arc::new(|state| {
//!     println!("{} calls, loading={}", state.value.len(), state.loading);
//! }))?;
//!
//! registry.unsubscribe(handle);
//! ```

mod listeners;
mod registry;
mod types;

pub(crate) use listeners::ListenerTable;
pub use registry::SubscriptionRegistry;
pub use types::{Listener, ListenerId, SubscriptionHandle};
