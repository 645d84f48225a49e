// SPDX-License-Identifier: Apache-2.0
//! Claude-style family adapter — JSONL stdout, `init` carries `session_id`
//! immediately.

use serde_json::Value;

use corral_core::model::{Message, MessageContent, MessageKind, StreamFrame};

use crate::adapter::{AdapterSession, AgentAdapter, StartOptions};
use crate::error::AdapterError;
use crate::subprocess::{spawn_line_driven_subprocess, LineOutcome};

pub struct ClaudeAdapter {
    pub program: String,
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AgentAdapter for ClaudeAdapter {
    fn family(&self) -> &'static str {
        "claude"
    }

    async fn start_session(&self, opts: StartOptions) -> Result<AdapterSession, AdapterError> {
        let mut args = vec!["--output-format".to_string(), "stream-json".to_string()];
        if let Some(model) = &opts.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(resume) = &opts.resume_session_id {
            args.push("--resume".to_string());
            args.push(resume.clone());
        }

        let (stream, input_tx, abort_tx) = spawn_line_driven_subprocess(
            &self.program,
            &args,
            opts.cwd.clone(),
            |raw| match parse_line(raw) {
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
            placeholder_session_id: opts
                .resume_session_id
                .unwrap_or_else(|| format!("pending-{}", uuid::Uuid::new_v4())),
        })
    }
}

fn parse_line(raw: &str) -> Option<StreamFrame> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let kind = value.get("type")?.as_str()?;
    match kind {
        "system" if value.get("subtype").and_then(Value::as_str) == Some("init") => {
            Some(StreamFrame::Init {
                session_id: value.get("session_id")?.as_str()?.to_string(),
                cwd: value.get("cwd")?.as_str()?.into(),
            })
        }
        "result" => Some(StreamFrame::Result {
            session_id: value.get("session_id")?.as_str().unwrap_or_default().to_string(),
        }),
        "error" => Some(StreamFrame::Error {
            session_id: value.get("session_id").and_then(Value::as_str).unwrap_or_default().to_string(),
            error: value.get("error").and_then(Value::as_str).unwrap_or("unknown adapter error").to_string(),
        }),
        "assistant" | "user" => {
            let message_kind = if kind == "assistant" { MessageKind::Assistant } else { MessageKind::User };
            let content = value.get("message").and_then(|m| m.get("content")).cloned();
            Some(StreamFrame::Message {
                message: Message {
                    id: value.get("uuid").and_then(Value::as_str).unwrap_or_default().to_string(),
                    kind: message_kind,
                    content: content.and_then(|c| serde_json::from_value::<MessageContent>(c).ok()),
                    parent_id: value.get("parent_uuid").and_then(Value::as_str).map(String::from),
                    timestamp: None,
                    extra: Default::default(),
                },
            })
        }
        _ => None,
    }
}
