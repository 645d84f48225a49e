// SPDX-License-Identifier: Apache-2.0
//! Worker Queue — a per-project FIFO of start-session requests, with
//! 1-based position tracking and cancellation. A request is enqueued, a
//! worker dequeues it and eventually resolves it via a `oneshot`.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::event_bus::{ActivityEvent, EventBus};
use crate::model::ProjectId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    NewSession,
    ResumeSession { session_id: String },
}

#[derive(Debug, Clone)]
pub enum WorkerResult<T> {
    Success(T),
    Failure(String),
    Cancelled,
}

struct QueueEntry<T> {
    queue_id: String,
    kind: RequestKind,
    resolve: oneshot::Sender<WorkerResult<T>>,
}

/// A handle returned by `enqueue`; `promise` resolves once a worker calls
/// `resolve` on the matching `WorkerRequest`, or the entry is cancelled.
pub struct EnqueueResult<T> {
    pub queue_id: String,
    pub position: usize,
    pub promise: oneshot::Receiver<WorkerResult<T>>,
}

/// The request a worker pulls off the queue; `resolve` completes the
/// caller's `promise`.
pub struct WorkerRequest<T> {
    pub queue_id: String,
    pub kind: RequestKind,
    resolve: oneshot::Sender<WorkerResult<T>>,
}

impl<T> WorkerRequest<T> {
    pub fn resolve(self, result: WorkerResult<T>) {
        let _ = self.resolve.send(result);
    }
}

pub struct WorkerQueue<T> {
    project_id: ProjectId,
    entries: std::sync::Mutex<VecDeque<QueueEntry<T>>>,
    event_bus: EventBus,
}

impl<T> WorkerQueue<T> {
    pub fn new(project_id: ProjectId, event_bus: EventBus) -> Self {
        Self {
            project_id,
            entries: std::sync::Mutex::new(VecDeque::new()),
            event_bus,
        }
    }

    pub fn enqueue(&self, kind: RequestKind) -> EnqueueResult<T> {
        let queue_id = Uuid::new_v4().to_string();
        let (resolve, promise) = oneshot::channel();
        let mut entries = self.entries.lock().unwrap();
        entries.push_back(QueueEntry {
            queue_id: queue_id.clone(),
            kind,
            resolve,
        });
        let position = entries.len();
        drop(entries);

        self.event_bus.publish(ActivityEvent::QueueRequestAdded {
            project_id: self.project_id.clone(),
            queue_id: queue_id.clone(),
            position,
        });

        EnqueueResult {
            queue_id,
            position,
            promise,
        }
    }

    /// Head removal; emits `queue-position-changed` for every remaining
    /// request whose index shifted.
    pub fn dequeue(&self) -> Option<WorkerRequest<T>> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.pop_front()?;
        let shifted: Vec<String> = entries.iter().map(|e| e.queue_id.clone()).collect();
        drop(entries);

        for (idx, queue_id) in shifted.into_iter().enumerate() {
            self.event_bus.publish(ActivityEvent::QueuePositionChanged {
                project_id: self.project_id.clone(),
                queue_id,
                position: idx + 1,
            });
        }

        Some(WorkerRequest {
            queue_id: entry.queue_id,
            kind: entry.kind,
            resolve: entry.resolve,
        })
    }

    pub fn cancel(&self, queue_id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(idx) = entries.iter().position(|e| e.queue_id == queue_id) else {
            return false;
        };
        let entry = entries.remove(idx).unwrap();
        let shifted: Vec<String> = entries
            .iter()
            .skip(idx)
            .map(|e| e.queue_id.clone())
            .collect();
        drop(entries);

        let _ = entry.resolve.send(WorkerResult::Cancelled);
        self.event_bus.publish(ActivityEvent::QueueRequestRemoved {
            project_id: self.project_id.clone(),
            queue_id: queue_id.to_string(),
            reason: "cancelled".to_string(),
        });
        for (offset, shifted_id) in shifted.into_iter().enumerate() {
            self.event_bus.publish(ActivityEvent::QueuePositionChanged {
                project_id: self.project_id.clone(),
                queue_id: shifted_id,
                position: idx + offset + 1,
            });
        }
        true
    }

    pub fn find_by_session_id(&self, session_id: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| matches!(&e.kind, RequestKind::ResumeSession { session_id: s } if s == session_id))
            .map(|e| e.queue_id.clone())
    }

    pub fn get_position(&self, queue_id: &str) -> Option<usize> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .position(|e| e.queue_id == queue_id)
            .map(|i| i + 1)
    }

    pub fn peek(&self) -> Option<String> {
        self.entries.lock().unwrap().front().map(|e| e.queue_id.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn length(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_and_queue() -> WorkerQueue<()> {
        WorkerQueue::new(ProjectId("p1".into()), EventBus::new())
    }

    #[test]
    fn positions_are_one_based_and_reflect_head_distance() {
        let q = bus_and_queue();
        let a = q.enqueue(RequestKind::NewSession);
        let b = q.enqueue(RequestKind::NewSession);
        assert_eq!(a.position, 1);
        assert_eq!(b.position, 2);
        assert_eq!(q.get_position(&b.queue_id), Some(2));
    }

    #[tokio::test]
    async fn dequeue_resolves_via_worker_and_shifts_positions() {
        let q = bus_and_queue();
        let a = q.enqueue(RequestKind::NewSession);
        let b = q.enqueue(RequestKind::NewSession);

        let worker_req = q.dequeue().unwrap();
        assert_eq!(worker_req.queue_id, a.queue_id);
        assert_eq!(q.get_position(&b.queue_id), Some(1));

        worker_req.resolve(WorkerResult::Success(()));
        let result = a.promise.await.unwrap();
        assert!(matches!(result, WorkerResult::Success(())));
    }

    #[tokio::test]
    async fn cancel_resolves_promise_and_removes_entry() {
        let q = bus_and_queue();
        let a = q.enqueue(RequestKind::NewSession);
        assert!(q.cancel(&a.queue_id));
        let result = a.promise.await.unwrap();
        assert!(matches!(result, WorkerResult::Cancelled));
        assert!(q.is_empty());
    }

    #[test]
    fn cancel_unknown_id_returns_false() {
        let q: WorkerQueue<()> = bus_and_queue();
        assert!(!q.cancel("nonexistent"));
    }

    #[test]
    fn find_by_session_id_locates_resume_requests() {
        let q = bus_and_queue();
        q.enqueue(RequestKind::NewSession);
        let resume = q.enqueue(RequestKind::ResumeSession {
            session_id: "s1".into(),
        });
        assert_eq!(q.find_by_session_id("s1"), Some(resume.queue_id));
        assert_eq!(q.find_by_session_id("missing"), None);
    }
}
