// SPDX-License-Identifier: Apache-2.0
//! Wires an adapter's [`AdapterSession`] to a [`corral_core::process::Process`]:
//! instantiates the adapter for the requested agent family, wraps its
//! stream in a `Process`, and registers it with the supervisor.

use corral_core::model::{PermissionMode, ProjectId};
use corral_core::process::Process;

use crate::adapter::{AgentAdapter, StartOptions};
use crate::error::AdapterError;

/// Build a `Process` bound to the named family's adapter and spawn the
/// forwarding task that drains the Process's Message Queue into the
/// adapter's stdin channel.
pub async fn start_session(
    adapter: &dyn AgentAdapter,
    project_id: ProjectId,
    opts: StartOptions,
    initial_mode: PermissionMode,
    subscriber_queue_depth: usize,
) -> Result<Process, AdapterError> {
    let crate::adapter::AdapterSession {
        stream,
        input_tx,
        abort_tx,
        placeholder_session_id,
    } = adapter.start_session(opts).await?;

    let process = Process::spawn(
        project_id,
        placeholder_session_id,
        initial_mode,
        subscriber_queue_depth,
        stream,
        abort_tx,
    );

    let forward = process.clone();
    tokio::spawn(async move {
        while let Some(text) = forward.next_queued_input().await {
            if input_tx.send(text).is_err() {
                break;
            }
        }
    });

    Ok(process)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterSession;
    use corral_core::model::StreamFrame;

    struct EchoAdapter;

    #[async_trait::async_trait]
    impl AgentAdapter for EchoAdapter {
        fn family(&self) -> &'static str {
            "echo"
        }

        async fn start_session(&self, opts: StartOptions) -> Result<AdapterSession, AdapterError> {
            let (input_tx, mut input_rx) = tokio::sync::mpsc::unbounded_channel();
            let (abort_tx, _abort_rx) = tokio::sync::oneshot::channel();
            let (frame_tx, frame_rx) = tokio::sync::mpsc::channel(8);

            tokio::spawn(async move {
                let _ = frame_tx
                    .send(Ok(StreamFrame::Init {
                        session_id: "echo-1".into(),
                        cwd: opts.cwd,
                    }))
                    .await;
                while let Some(text) = input_rx.recv().await {
                    let _ = frame_tx
                        .send(Ok(StreamFrame::Message {
                            message: corral_core::model::Message {
                                id: "m1".into(),
                                kind: corral_core::model::MessageKind::Assistant,
                                content: Some(corral_core::model::MessageContent::Text(text)),
                                parent_id: None,
                                timestamp: None,
                                extra: Default::default(),
                            },
                        }))
                        .await;
                }
            });

            Ok(AdapterSession {
                stream: Box::pin(tokio_stream::wrappers::ReceiverStream::new(frame_rx)),
                input_tx,
                abort_tx,
                placeholder_session_id: "placeholder".into(),
            })
        }
    }

    #[tokio::test]
    async fn queued_message_round_trips_through_the_adapter() {
        let adapter = EchoAdapter;
        let opts = StartOptions {
            cwd: std::path::PathBuf::from("/tmp"),
            model: None,
            resume_session_id: None,
            permission_mode: PermissionMode::Default,
            initial_message: None,
        };

        let process = start_session(&adapter, ProjectId("p1".into()), opts, PermissionMode::Default, 8)
            .await
            .unwrap();

        let mut sub = process.subscribe().await;
        process.queue_message("hello".into()).await.unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(1), sub.rx.recv())
            .await
            .expect("event within timeout")
            .expect("event present");

        match event {
            corral_core::model::ProcessEvent::Message { message } => {
                assert_eq!(message.as_text(), Some("hello"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
