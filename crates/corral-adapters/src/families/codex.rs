// SPDX-License-Identifier: Apache-2.0
//! Codex-style family adapter — the session id is not known until the first
//! agent event arrives. The adapter registers the Process under a temporary
//! `pending-<timestamp>` id and emits `init` only once the real id arrives;
//! the Process driver detects the id drift against the placeholder and
//! publishes `session-id-changed` itself.

use serde_json::Value;

use corral_core::model::{Message, MessageContent, MessageKind, StreamFrame};

use crate::adapter::{AdapterSession, AgentAdapter, StartOptions};
use crate::error::AdapterError;
use crate::subprocess::{spawn_line_driven_subprocess, LineOutcome};

pub struct CodexAdapter {
    pub program: String,
}

impl Default for CodexAdapter {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AgentAdapter for CodexAdapter {
    fn family(&self) -> &'static str {
        "codex"
    }

    async fn start_session(&self, opts: StartOptions) -> Result<AdapterSession, AdapterError> {
        let mut args = vec!["proto".to_string()];
        if let Some(model) = &opts.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        let placeholder = format!("pending-{}", chrono::Utc::now().timestamp_millis());
        let placeholder_for_parser = placeholder.clone();
        let cwd_for_parser = opts.cwd.clone();

        let (stream, input_tx, abort_tx) = spawn_line_driven_subprocess(
            &self.program,
            &args,
            opts.cwd.clone(),
            move |raw| match parse_line(raw, &placeholder_for_parser, &cwd_for_parser) {
                Some(frame) => LineOutcome::Frame(frame),
                None => LineOutcome::Ignore,
            },
        )?;

        if let Some(initial) = opts.initial_message {
            let _ = input_tx.send(initial);
        }

        Ok(AdapterSession {
            stream,
            input_tx,
            abort_tx,
            placeholder_session_id: placeholder,
        })
    }
}

fn parse_line(raw: &str, placeholder: &str, cwd: &std::path::Path) -> Option<StreamFrame> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let kind = value.get("type")?.as_str()?;
    match kind {
        "session_configured" => Some(StreamFrame::Init {
            session_id: value.get("session_id")?.as_str()?.to_string(),
            cwd: cwd.to_path_buf(),
        }),
        "task_complete" => Some(StreamFrame::Result {
            session_id: value.get("session_id").and_then(Value::as_str).unwrap_or(placeholder).to_string(),
        }),
        "error" => Some(StreamFrame::Error {
            session_id: value.get("session_id").and_then(Value::as_str).unwrap_or(placeholder).to_string(),
            error: value.get("message").and_then(Value::as_str).unwrap_or("unknown adapter error").to_string(),
        }),
        "agent_message" | "user_message" => {
            let message_kind = if kind == "agent_message" { MessageKind::Assistant } else { MessageKind::User };
            let text = value.get("message").and_then(Value::as_str).map(String::from);
            Some(StreamFrame::Message {
                message: Message {
                    id: value.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    kind: message_kind,
                    content: text.map(MessageContent::Text),
                    parent_id: None,
                    timestamp: None,
                    extra: Default::default(),
                },
            })
        }
        _ => None,
    }
}
