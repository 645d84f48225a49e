// SPDX-License-Identifier: Apache-2.0
//! Per-connection subscription bookkeeping: `eventId` is strictly
//! monotonic within one subscription and has no relation across
//! subscriptions.

use std::collections::HashMap;

use tokio::task::JoinHandle;

/// Tracks the next `eventId` to hand out and the background task (heartbeat
/// or channel-forwarder) that must be aborted when the subscription ends.
pub struct SubscriptionState {
    next_event_id: u64,
    pub task: Option<JoinHandle<()>>,
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self {
            next_event_id: 0,
            task: None,
        }
    }

    pub fn next_event_id(&mut self) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscriptionState {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// All subscriptions live on one connection; keyed by the client-supplied
/// `subscriptionId`.
#[derive(Default)]
pub struct SubscriptionTable {
    entries: HashMap<String, SubscriptionState>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subscription_id: String, state: SubscriptionState) {
        self.entries.insert(subscription_id, state);
    }

    pub fn next_event_id(&mut self, subscription_id: &str) -> Option<u64> {
        self.entries.get_mut(subscription_id).map(|s| s.next_event_id())
    }

    /// Remove and drop a subscription, aborting its background task.
    pub fn remove(&mut self, subscription_id: &str) {
        self.entries.remove(subscription_id);
    }

    pub fn contains(&self, subscription_id: &str) -> bool {
        self.entries.contains_key(subscription_id)
    }

    /// Teardown on connection close.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_monotonic_within_a_subscription() {
        let mut table = SubscriptionTable::new();
        table.insert("sub-1".into(), SubscriptionState::new());
        assert_eq!(table.next_event_id("sub-1"), Some(0));
        assert_eq!(table.next_event_id("sub-1"), Some(1));
        assert_eq!(table.next_event_id("sub-1"), Some(2));
    }

    #[test]
    fn separate_subscriptions_track_independent_counters() {
        let mut table = SubscriptionTable::new();
        table.insert("sub-1".into(), SubscriptionState::new());
        table.insert("sub-2".into(), SubscriptionState::new());
        table.next_event_id("sub-1");
        table.next_event_id("sub-1");
        assert_eq!(table.next_event_id("sub-2"), Some(0));
    }

    #[test]
    fn removing_a_subscription_drops_its_counter() {
        let mut table = SubscriptionTable::new();
        table.insert("sub-1".into(), SubscriptionState::new());
        table.remove("sub-1");
        assert_eq!(table.next_event_id("sub-1"), None);
    }
}
