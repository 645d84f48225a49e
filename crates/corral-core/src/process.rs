// SPDX-License-Identifier: Apache-2.0
//! Process — the in-memory wrapper around one live agent subprocess: a
//! cheap, cloneable handle in front of state protected by a driver task that
//! is the only writer.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::approval::{arbitrate, Verdict};
use crate::error::CoreError;
use crate::model::{
    AdapterExit, Message, PendingInputRequest, PermissionMode, ProcessEvent, ProcessStateKind,
    StreamFrame,
};
use crate::queue::MessageQueue;

/// Outcome of a successful `handle_tool_approval` resolution.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub behavior: ApprovalBehavior,
    pub updated_input: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalBehavior {
    Allow,
    Deny,
}

/// What a caller supplies to `respond_to_input`.
#[derive(Debug, Clone)]
pub enum InputOutcome {
    Approve { payload: Option<serde_json::Value> },
    Deny,
}

/// Result of `queue_message`.
#[derive(Debug, Clone)]
pub struct QueuePosition {
    pub position: usize,
}

struct PendingApproval {
    request: PendingInputRequest,
    reply: oneshot::Sender<ApprovalOutcome>,
}

struct Subscriber {
    tx: mpsc::Sender<ProcessEvent>,
}

struct Inner {
    process_id: Uuid,
    project_id: crate::model::ProjectId,
    session_id: Mutex<String>,
    state: Mutex<ProcessStateKind>,
    state_before_hold: Mutex<Option<ProcessStateKind>>,
    mode: Mutex<PermissionMode>,
    mode_version: AtomicU64,
    hold: Mutex<bool>,
    hold_notify: Notify,
    /// Subscriber ids are monotonic so unsubscribe can target one entry.
    next_subscriber_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    history: Mutex<Vec<Message>>,
    streaming: Mutex<HashMap<String, String>>,
    /// FIFO of tool-approval requests awaiting `respond_to_input`; only the
    /// front entry is exposed via `pending_input_request()`.
    pending: Mutex<std::collections::VecDeque<PendingApproval>>,
    queue: MessageQueue<QueuedMessage>,
    terminated: Mutex<Option<AdapterExit>>,
    subscriber_queue_depth: usize,
}

struct QueuedMessage {
    text: String,
}

/// A fan-out listener handle. Dropping it does not unsubscribe; call
/// `Process::unsubscribe` explicitly, since unsubscription also needs to
/// remove the map entry under lock.
pub struct Subscription {
    pub id: u64,
    pub rx: mpsc::Receiver<ProcessEvent>,
}

/// Handle to one running agent. Cheap to clone; all mutable state lives
/// behind `Inner`'s locks.
#[derive(Clone)]
pub struct Process {
    inner: Arc<Inner>,
    abort_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame, String>> + Send>>;

impl Process {
    /// Construct a Process around an adapter's frame stream and spawn its
    /// driver task. `placeholder_session_id` is replaced once an `init`
    /// frame (or a `session-id-changed` frame) supplies the real id.
    pub fn spawn(
        project_id: crate::model::ProjectId,
        placeholder_session_id: String,
        initial_mode: PermissionMode,
        subscriber_queue_depth: usize,
        stream: FrameStream,
        abort_tx: oneshot::Sender<()>,
    ) -> Self {
        let inner = Arc::new(Inner {
            process_id: Uuid::new_v4(),
            project_id,
            session_id: Mutex::new(placeholder_session_id),
            state: Mutex::new(ProcessStateKind::Spawning),
            state_before_hold: Mutex::new(None),
            mode: Mutex::new(initial_mode),
            mode_version: AtomicU64::new(0),
            hold: Mutex::new(false),
            hold_notify: Notify::new(),
            next_subscriber_id: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            streaming: Mutex::new(HashMap::new()),
            pending: Mutex::new(std::collections::VecDeque::new()),
            queue: MessageQueue::new(),
            terminated: Mutex::new(None),
            subscriber_queue_depth,
        });

        let process = Process {
            inner: inner.clone(),
            abort_tx: Arc::new(Mutex::new(Some(abort_tx))),
        };

        tokio::spawn(drive(inner, stream));

        process
    }

    pub fn process_id(&self) -> Uuid {
        self.inner.process_id
    }

    pub fn project_id(&self) -> &crate::model::ProjectId {
        &self.inner.project_id
    }

    pub async fn session_id(&self) -> String {
        self.inner.session_id.lock().await.clone()
    }

    pub async fn state(&self) -> ProcessStateKind {
        *self.inner.state.lock().await
    }

    pub async fn mode(&self) -> PermissionMode {
        *self.inner.mode.lock().await
    }

    pub fn mode_version(&self) -> u64 {
        self.inner.mode_version.load(Ordering::SeqCst)
    }

    /// Append to the Message Queue and record history. Fails with
    /// `CoreError::Terminated` if the process is no longer live.
    pub async fn queue_message(&self, text: String) -> Result<QueuePosition, CoreError> {
        if self.inner.terminated.lock().await.is_some() {
            return Err(CoreError::Terminated(
                "process has terminated, cannot queue message".into(),
            ));
        }
        self.inner.history.lock().await.push(Message {
            id: Uuid::new_v4().to_string(),
            kind: crate::model::MessageKind::User,
            content: Some(crate::model::MessageContent::Text(text.clone())),
            parent_id: None,
            timestamp: Some(chrono::Utc::now()),
            extra: Default::default(),
        });
        let position = self.inner.queue.len() + 1;
        self.inner.queue.push(QueuedMessage { text });
        Ok(QueuePosition { position })
    }

    /// Pop the next queued user input, waiting if none is buffered. Returns
    /// `None` once the process has terminated and the queue is drained — the
    /// adapter's stdin-forwarding loop uses this as its sole input source.
    pub async fn next_queued_input(&self) -> Option<String> {
        self.inner.queue.pop().await.map(|m| m.text)
    }

    /// Register a fan-out listener. The subscribe() call takes the same
    /// lock the driver uses to publish events, writes the `connected`
    /// preamble (history replay is the transport's job — here, the
    /// streaming-buffer flush) directly into the
    /// new subscriber's channel, and only then inserts it into the map — all
    /// under one critical section, so no `message` event published after
    /// this call can race ahead of the preamble.
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.subscriber_queue_depth);
        let mut subs = self.inner.subscribers.lock().await;
        let streaming = self.inner.streaming.lock().await;
        for (assistant_id, partial) in streaming.iter() {
            let _ = tx.try_send(ProcessEvent::Message {
                message: Message {
                    id: assistant_id.clone(),
                    kind: crate::model::MessageKind::Assistant,
                    content: Some(crate::model::MessageContent::Text(partial.clone())),
                    parent_id: None,
                    timestamp: None,
                    extra: Default::default(),
                },
            });
        }
        drop(streaming);
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        subs.insert(id, Subscriber { tx });
        Subscription { id, rx }
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.inner.subscribers.lock().await.remove(&id);
    }

    pub async fn get_message_history(&self) -> Vec<Message> {
        self.inner.history.lock().await.clone()
    }

    pub async fn get_streaming_content(&self) -> HashMap<String, String> {
        self.inner.streaming.lock().await.clone()
    }

    /// Idempotent; bumps `mode_version` and emits `mode-change` only on
    /// actual change.
    pub async fn set_permission_mode(&self, mode: PermissionMode) {
        let mut current = self.inner.mode.lock().await;
        if *current == mode {
            return;
        }
        *current = mode;
        let version = self.inner.mode_version.fetch_add(1, Ordering::SeqCst) + 1;
        drop(current);
        publish(&self.inner, ProcessEvent::ModeChange { mode, version }).await;
    }

    /// When turning on, the driver parks before its next stream pull; when
    /// turning off, it resumes. Idempotent.
    pub async fn set_hold(&self, on: bool) {
        let mut hold = self.inner.hold.lock().await;
        if *hold == on {
            return;
        }
        *hold = on;
        drop(hold);
        if !on {
            self.inner.hold_notify.notify_waiters();
        }
    }

    /// The tool-approval arbiter. Returns a future that resolves when
    /// `respond_to_input` answers the enqueued request, when `cancel`
    /// fires (the request is dropped from the queue and the call resolves
    /// deny — e.g. the requesting connection disconnected), or immediately
    /// for an auto-allowed tool.
    pub async fn handle_tool_approval(
        &self,
        tool_name: String,
        input: serde_json::Value,
        prompt: Option<String>,
        cancel: oneshot::Receiver<()>,
    ) -> Result<ApprovalOutcome, CoreError> {
        let mode = *self.inner.mode.lock().await;
        match arbitrate(mode, &tool_name) {
            Verdict::Allow => Ok(ApprovalOutcome {
                behavior: ApprovalBehavior::Allow,
                updated_input: None,
            }),
            Verdict::Prompt => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let request = PendingInputRequest {
                    id: Uuid::new_v4().to_string(),
                    tool_name: tool_name.clone(),
                    input,
                    prompt,
                };
                let request_id = request.id.clone();
                {
                    let mut pending = self.inner.pending.lock().await;
                    pending.push_back(PendingApproval {
                        request: request.clone(),
                        reply: reply_tx,
                    });
                }
                *self.inner.state.lock().await = ProcessStateKind::WaitingInput;
                publish(
                    &self.inner,
                    ProcessEvent::PendingInput {
                        request: request.clone(),
                    },
                )
                .await;

                tokio::select! {
                    result = reply_rx => {
                        result.map_err(|_| CoreError::Terminated("approval dropped".into()))
                    }
                    _ = cancel => {
                        let mut pending = self.inner.pending.lock().await;
                        pending.retain(|entry| entry.request.id != request_id);
                        let now_empty = pending.is_empty();
                        drop(pending);
                        if now_empty && self.inner.terminated.lock().await.is_none() {
                            *self.inner.state.lock().await = ProcessStateKind::InTurn;
                        }
                        Ok(ApprovalOutcome {
                            behavior: ApprovalBehavior::Deny,
                            updated_input: None,
                        })
                    }
                }
            }
        }
    }

    /// Supplies the answer to the head pending request. Returns `false` if
    /// `request_id` no longer exists (already answered, cancelled, or the
    /// process terminated and cleared its pending list).
    pub async fn respond_to_input(
        &self,
        request_id: &str,
        outcome: InputOutcome,
    ) -> Result<bool, CoreError> {
        let mut pending = self.inner.pending.lock().await;
        let Some(front) = pending.front() else {
            return Ok(false);
        };
        if front.request.id != request_id {
            return Ok(false);
        }
        let entry = pending.pop_front().unwrap();
        drop(pending);

        let tool_name = entry.request.tool_name.clone();
        let original_input = entry.request.input.clone();

        let result = match outcome {
            InputOutcome::Approve { payload } => {
                if tool_name == "ExitPlanMode" {
                    self.set_permission_mode(PermissionMode::Default).await;
                }
                let updated_input = if tool_name == "AskUserQuestion" {
                    let mut merged = original_input.clone();
                    if let (Some(obj), Some(answers)) = (merged.as_object_mut(), payload) {
                        obj.insert("answers".to_string(), answers);
                    }
                    Some(merged)
                } else {
                    None
                };
                ApprovalOutcome {
                    behavior: ApprovalBehavior::Allow,
                    updated_input,
                }
            }
            InputOutcome::Deny => ApprovalOutcome {
                behavior: ApprovalBehavior::Deny,
                updated_input: None,
            },
        };

        let _ = entry.reply.send(result);

        if self.inner.pending.lock().await.is_empty() {
            let terminated = self.inner.terminated.lock().await.is_some();
            if !terminated {
                *self.inner.state.lock().await = ProcessStateKind::InTurn;
            }
        }
        Ok(true)
    }

    /// Cooperatively cancel the adapter, wake the queue, emit `complete`,
    /// clear listeners.
    pub async fn abort(&self) {
        if let Some(tx) = self.abort_tx.lock().await.take() {
            let _ = tx.send(());
        }
        self.inner.queue.close();
        publish(&self.inner, ProcessEvent::Complete).await;
        self.inner.subscribers.lock().await.clear();
    }
}

async fn publish(inner: &Arc<Inner>, event: ProcessEvent) {
    let subs = inner.subscribers.lock().await;
    for (id, sub) in subs.iter() {
        if sub.tx.try_send(event.clone()).is_err() {
            warn!(subscriber_id = id, "dropping slow process subscriber");
        }
    }
}

/// The driver task: consumes the adapter's frame stream, updates Process
/// state, and fans events out to subscribers. This is the only writer of
/// `Inner`'s state/mode/history fields besides the public setters above, so
/// there is a single sequencing point for events.
async fn drive(inner: Arc<Inner>, mut stream: FrameStream) {
    use futures::StreamExt;

    loop {
        if *inner.hold.lock().await {
            inner.hold_notify.notified().await;
            continue;
        }

        let frame = match stream.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                terminate(&inner, AdapterExit::Errored { message: err }).await;
                return;
            }
            None => {
                terminate(&inner, AdapterExit::AdapterClosed).await;
                return;
            }
        };

        match frame {
            StreamFrame::Init { session_id, .. } => {
                let mut current = inner.session_id.lock().await;
                let old = current.clone();
                if old != session_id {
                    *current = session_id.clone();
                    drop(current);
                    publish(
                        &inner,
                        ProcessEvent::SessionIdChanged {
                            old_session_id: old,
                            new_session_id: session_id,
                        },
                    )
                    .await;
                }
                let has_pending = !inner.pending.lock().await.is_empty()
                    || !inner.queue.is_empty();
                let new_state = if has_pending {
                    ProcessStateKind::InTurn
                } else {
                    ProcessStateKind::Idle
                };
                *inner.state.lock().await = new_state;
                publish(&inner, ProcessEvent::StateChange { state: new_state }).await;
            }
            StreamFrame::Message { message } => {
                if let Some(text) = message.as_text() {
                    if message.kind == crate::model::MessageKind::Assistant {
                        inner
                            .streaming
                            .lock()
                            .await
                            .insert(message.id.clone(), text.to_string());
                    }
                }
                inner.history.lock().await.push(message.clone());
                publish(&inner, ProcessEvent::Message { message }).await;
            }
            StreamFrame::Result { .. } => {
                inner.streaming.lock().await.clear();
                *inner.state.lock().await = ProcessStateKind::Idle;
                publish(
                    &inner,
                    ProcessEvent::StateChange {
                        state: ProcessStateKind::Idle,
                    },
                )
                .await;
            }
            StreamFrame::Error { error, .. } => {
                publish(&inner, ProcessEvent::Error { message: error.clone() }).await;
                terminate(&inner, AdapterExit::Errored { message: error }).await;
                return;
            }
            StreamFrame::SessionIdChanged {
                old_session_id,
                new_session_id,
            } => {
                *inner.session_id.lock().await = new_session_id.clone();
                publish(
                    &inner,
                    ProcessEvent::SessionIdChanged {
                        old_session_id,
                        new_session_id,
                    },
                )
                .await;
            }
            StreamFrame::LoginFlow { .. } => {
                debug!("login-flow frame received, forwarding not yet implemented at core layer");
            }
        }
    }
}

async fn terminate(inner: &Arc<Inner>, reason: AdapterExit) {
    *inner.terminated.lock().await = Some(reason.clone());
    *inner.state.lock().await = ProcessStateKind::Terminated;
    {
        let mut pending = inner.pending.lock().await;
        while let Some(entry) = pending.pop_front() {
            let _ = entry.reply.send(ApprovalOutcome {
                behavior: ApprovalBehavior::Deny,
                updated_input: None,
            });
        }
    }
    inner.queue.close();
    publish(&inner, ProcessEvent::Terminated { reason }).await;
    inner.subscribers.lock().await.clear();
    info!("process terminated");
}

/// A type alias matching the driver's expected async-closure signature,
/// kept for `corral-adapters` implementors to reference without depending on
/// `futures` directly.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[allow(dead_code)]
fn _assert_placeholder_unused(_: PathBuf) {}

#[cfg(test)]
mod tests {
    use super::*;
    use async_stream::stream;
    use futures::stream::StreamExt as _;

    fn project_id() -> crate::model::ProjectId {
        crate::model::ProjectId("test-project".into())
    }

    fn stream_of(frames: Vec<StreamFrame>) -> FrameStream {
        Box::pin(stream! {
            for f in frames {
                yield Ok(f);
            }
        })
    }

    #[tokio::test]
    async fn init_frame_replaces_placeholder_and_emits_session_id_changed() {
        let frames = stream_of(vec![StreamFrame::Init {
            session_id: "real-session".into(),
            cwd: PathBuf::from("/tmp"),
        }]);
        let (abort_tx, _abort_rx) = oneshot::channel();
        let process = Process::spawn(
            project_id(),
            "placeholder".into(),
            PermissionMode::Default,
            8,
            frames,
            abort_tx,
        );
        let mut sub = process.subscribe().await;
        let ev = tokio::time::timeout(std::time::Duration::from_millis(500), sub.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(ev, ProcessEvent::SessionIdChanged { .. }));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(process.session_id().await, "real-session");
    }

    #[tokio::test]
    async fn queue_message_fails_after_termination() {
        let frames = stream_of(vec![StreamFrame::Error {
            session_id: "s1".into(),
            error: "boom".into(),
        }]);
        let (abort_tx, _abort_rx) = oneshot::channel();
        let process = Process::spawn(
            project_id(),
            "placeholder".into(),
            PermissionMode::Default,
            8,
            frames,
            abort_tx,
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let result = process.queue_message("hi".into()).await;
        assert!(matches!(result, Err(CoreError::Terminated(_))));
    }

    #[tokio::test]
    async fn set_permission_mode_is_idempotent() {
        let frames: FrameStream = Box::pin(futures::stream::pending());
        let (abort_tx, _abort_rx) = oneshot::channel();
        let process = Process::spawn(
            project_id(),
            "placeholder".into(),
            PermissionMode::Default,
            8,
            frames,
            abort_tx,
        );
        let mut sub = process.subscribe().await;
        process.set_permission_mode(PermissionMode::Default).await;
        process.set_permission_mode(PermissionMode::AcceptEdits).await;
        let ev = tokio::time::timeout(std::time::Duration::from_millis(200), sub.rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            ev,
            ProcessEvent::ModeChange { mode: PermissionMode::AcceptEdits, version: 1 }
        ));
        assert_eq!(process.mode_version(), 1);
    }

    #[tokio::test]
    async fn handle_tool_approval_allows_read_only_immediately() {
        let frames: FrameStream = Box::pin(futures::stream::pending());
        let (abort_tx, _abort_rx) = oneshot::channel();
        let process = Process::spawn(
            project_id(),
            "placeholder".into(),
            PermissionMode::Plan,
            8,
            frames,
            abort_tx,
        );
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let outcome = process
            .handle_tool_approval("Read".into(), serde_json::json!({}), None, cancel_rx)
            .await
            .unwrap();
        assert_eq!(outcome.behavior, ApprovalBehavior::Allow);
    }

    #[tokio::test]
    async fn respond_to_input_only_answers_head_request() {
        let frames: FrameStream = Box::pin(futures::stream::pending());
        let (abort_tx, _abort_rx) = oneshot::channel();
        let process = Process::spawn(
            project_id(),
            "placeholder".into(),
            PermissionMode::Default,
            8,
            frames,
            abort_tx,
        );
        let p = process.clone();
        let (_cancel_tx, cancel_rx) = oneshot::channel();
        let approval = tokio::spawn(async move {
            p.handle_tool_approval("Bash".into(), serde_json::json!({"cmd": "ls"}), None, cancel_rx)
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let request_id = {
            let pending = process.inner.pending.lock().await;
            pending.front().unwrap().request.id.clone()
        };
        let answered = process
            .respond_to_input("not-the-id", InputOutcome::Deny)
            .await
            .unwrap();
        assert!(!answered);
        let answered = process
            .respond_to_input(&request_id, InputOutcome::Deny)
            .await
            .unwrap();
        assert!(answered);
        let outcome = approval.await.unwrap().unwrap();
        assert_eq!(outcome.behavior, ApprovalBehavior::Deny);
    }

    #[tokio::test]
    async fn cancelling_an_approval_denies_it_and_drops_it_from_the_queue() {
        let frames: FrameStream = Box::pin(futures::stream::pending());
        let (abort_tx, _abort_rx) = oneshot::channel();
        let process = Process::spawn(
            project_id(),
            "placeholder".into(),
            PermissionMode::Default,
            8,
            frames,
            abort_tx,
        );
        let p = process.clone();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let approval = tokio::spawn(async move {
            p.handle_tool_approval("Bash".into(), serde_json::json!({"cmd": "ls"}), None, cancel_rx)
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(process.inner.pending.lock().await.len(), 1);

        cancel_tx.send(()).unwrap();
        let outcome = approval.await.unwrap().unwrap();
        assert_eq!(outcome.behavior, ApprovalBehavior::Deny);
        assert!(process.inner.pending.lock().await.is_empty());
    }
}
