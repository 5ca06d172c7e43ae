//! Subscription types for live resource updates.

use crate::types::{ResourceKey, ResourceState};
use std::sync::Arc;

/// Callback receiving every state transition of one resource key.
pub type Listener<T> = Arc<dyn Fn(&ResourceState<T>) + Send + Sync>;

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Handle returned by `subscribe`, consumed by `unsubscribe`.
///
/// Not `Clone`: a registration can only be removed once.
#[derive(Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub(crate) id: ListenerId,
    pub(crate) key: ResourceKey,
}

impl SubscriptionHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}
