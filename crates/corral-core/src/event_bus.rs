// SPDX-License-Identifier: Apache-2.0
//! Event Bus — coarse-grained pub/sub for cross-cutting activity. A thin
//! wrapper around `tokio::broadcast` for fan-out to every connected
//! operator.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::ProjectId;

/// Activity events crossing project/session/queue boundaries. Not a durable
/// log: subscribers only see events published after they subscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    SessionActive {
        session_id: String,
        project_id: ProjectId,
    },
    QueueRequestAdded {
        project_id: ProjectId,
        queue_id: String,
        position: usize,
    },
    QueuePositionChanged {
        project_id: ProjectId,
        queue_id: String,
        position: usize,
    },
    QueueRequestRemoved {
        project_id: ProjectId,
        queue_id: String,
        reason: String,
    },
    ProjectDiscovered {
        project_id: ProjectId,
    },
    ProjectOwnershipChanged {
        project_id: ProjectId,
        session_id: String,
        ownership: String,
    },
}

/// Events are small, so a generous buffer absorbs bursts without lagging a
/// slow subscriber into a `RecvError::Lagged`.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ActivityEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish; ignored if there are no subscribers.
    pub fn publish(&self, event: ActivityEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events_published_after_subscribing() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(ActivityEvent::ProjectDiscovered {
            project_id: ProjectId("p1".into()),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ActivityEvent::ProjectDiscovered { .. }));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(ActivityEvent::ProjectDiscovered {
            project_id: ProjectId("p1".into()),
        });
    }
}
