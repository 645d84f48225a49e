// SPDX-License-Identifier: Apache-2.0
//! Agent Client Protocol family adapter — a protocol-driven family where
//! tool-call requests arrive as distinct JSON-RPC-shaped messages rather
//! than content blocks embedded in an assistant message. This
//! implementation always declines them, writing the decline straight back
//! to the subprocess's stdin rather than surfacing a pending input request.

use serde_json::{json, Value};

use corral_core::model::{Message, MessageContent, MessageKind, StreamFrame};

use crate::adapter::{AdapterSession, AgentAdapter, StartOptions};
use crate::error::AdapterError;
use crate::subprocess::{spawn_line_driven_subprocess, LineOutcome};

pub struct AcpAdapter {
    pub program: String,
}

impl Default for AcpAdapter {
    fn default() -> Self {
        Self {
            program: "acp-agent".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AgentAdapter for AcpAdapter {
    fn family(&self) -> &'static str {
        "acp"
    }

    async fn start_session(&self, opts: StartOptions) -> Result<AdapterSession, AdapterError> {
        let session_id = opts
            .resume_session_id
            .clone()
            .unwrap_or_else(|| format!("acp-{}", uuid::Uuid::new_v4()));
        let session_id_for_parser = session_id.clone();

        let (stream, input_tx, abort_tx) = spawn_line_driven_subprocess(
            &self.program,
            &[],
            opts.cwd.clone(),
            move |raw| parse_line(raw, &session_id_for_parser),
        )?;

        if let Some(initial) = opts.initial_message {
            let _ = input_tx.send(initial);
        }

        Ok(AdapterSession {
            stream,
            input_tx,
            abort_tx,
            placeholder_session_id: session_id,
        })
    }
}

fn parse_line(raw: &str, session_id: &str) -> LineOutcome {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return LineOutcome::Ignore;
    };
    let Some(method) = value.get("method").and_then(Value::as_str) else {
        return LineOutcome::Ignore;
    };

    match method {
        "session/update" => update_message(&value)
            .map(LineOutcome::Frame)
            .unwrap_or(LineOutcome::Ignore),
        "session/request_permission" => {
            let request_id = value.get("id").cloned().unwrap_or(Value::Null);
            LineOutcome::WriteBack(decline_response(&request_id).to_string())
        }
        "session/finished" => LineOutcome::Frame(StreamFrame::Result {
            session_id: session_id.to_string(),
        }),
        _ => LineOutcome::Ignore,
    }
}

fn update_message(value: &Value) -> Option<StreamFrame> {
    let text = value
        .get("params")?
        .get("update")?
        .get("content")?
        .get("text")?
        .as_str()?
        .to_string();
    Some(StreamFrame::Message {
        message: Message {
            id: value.get("id").and_then(Value::as_str).unwrap_or_default().to_string(),
            kind: MessageKind::Assistant,
            content: Some(MessageContent::Text(text)),
            parent_id: None,
            timestamp: None,
            extra: Default::default(),
        },
    })
}

fn decline_response(request_id: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "result": { "outcome": "cancelled" },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_request_declines_with_a_json_rpc_write_back() {
        let raw = json!({
            "method": "session/request_permission",
            "id": "req-1",
            "params": { "toolCall": { "title": "delete_file" } },
        })
        .to_string();

        match parse_line(&raw, "s1") {
            LineOutcome::WriteBack(reply) => {
                let parsed: Value = serde_json::from_str(&reply).unwrap();
                assert_eq!(parsed["result"]["outcome"], "cancelled");
                assert_eq!(parsed["id"], "req-1");
            }
            _ => panic!("expected a write-back decline"),
        }
    }

    #[test]
    fn session_update_parses_into_an_assistant_message() {
        let raw = json!({
            "method": "session/update",
            "id": "u1",
            "params": { "update": { "content": { "text": "hello" } } },
        })
        .to_string();

        match parse_line(&raw, "s1") {
            LineOutcome::Frame(StreamFrame::Message { message }) => {
                assert_eq!(message.as_text(), Some("hello"));
            }
            _ => panic!("expected a message frame"),
        }
    }

    #[test]
    fn unrecognized_method_is_ignored() {
        let raw = json!({ "method": "session/unknown" }).to_string();
        assert!(matches!(parse_line(&raw, "s1"), LineOutcome::Ignore));
    }
}
