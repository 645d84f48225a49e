// SPDX-License-Identifier: Apache-2.0
//! Message Queue — a FIFO of pending user turns waiting to be delivered to
//! an agent adapter's stdin/`sendMessage`.
//!
//! Built on `Mutex<VecDeque<T>>` + `tokio::sync::Notify` rather than a
//! `tokio::mpsc` channel: `mpsc` has no way to drain the remaining items and
//! hand a consumer a single terminal "closed" signal in one step, which the
//! close() semantics below require.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

/// A drained message queue yields `None` forever once `close()` has been
/// called and all buffered items consumed.
pub struct MessageQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    closed: Mutex<bool>,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: Mutex::new(false),
        }
    }

    /// Push an item and wake one waiting consumer, if any.
    ///
    /// Returns `false` without enqueuing if the queue is already closed.
    pub fn push(&self, item: T) -> bool {
        if *self.closed.lock().unwrap() {
            return false;
        }
        self.items.lock().unwrap().push_back(item);
        self.notify.notify_one();
        true
    }

    /// Pop the next item, waiting if the queue is empty. Returns `None` once
    /// the queue has been closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            if let Some(item) = self.items.lock().unwrap().pop_front() {
                return Some(item);
            }
            if *self.closed.lock().unwrap() {
                return None;
            }
            // Register interest before checking again to avoid missing a
            // notification that fires between the check above and the wait.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.items.lock().unwrap().is_empty() || *self.closed.lock().unwrap() {
                continue;
            }
            notified.await;
        }
    }

    /// Current number of buffered (not yet popped) items.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark the queue closed and wake every waiter. Buffered items already
    /// pushed are still delivered by `pop()`; once drained, `pop()` returns
    /// `None` permanently.
    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn pop_returns_items_in_fifo_order() {
        let q: MessageQueue<u32> = MessageQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, Some(2));
        assert_eq!(q.pop().await, Some(3));
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let q: Arc<MessageQueue<u32>> = Arc::new(MessageQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(42);

        let result = tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("pop task did not finish")
            .unwrap();
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn close_drains_buffered_items_then_returns_none() {
        let q: MessageQueue<u32> = MessageQueue::new();
        q.push(1);
        q.close();
        assert_eq!(q.pop().await, Some(1));
        assert_eq!(q.pop().await, None);
        assert_eq!(q.pop().await, None);
    }

    #[tokio::test]
    async fn close_wakes_a_blocked_consumer_with_none() {
        let q: Arc<MessageQueue<u32>> = Arc::new(MessageQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.pop().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();

        let result = tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("pop task did not finish")
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn push_after_close_is_rejected() {
        let q: MessageQueue<u32> = MessageQueue::new();
        q.close();
        assert!(!q.push(1));
        assert_eq!(q.len(), 0);
    }
}
