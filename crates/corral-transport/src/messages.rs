// SPDX-License-Identifier: Apache-2.0
//! Wire message types layered on top of the frame/envelope transport, using
//! a tagged-union style (`#[serde(tag = "type", rename_all = "snake_case")]`)
//! for request/response plus subscription multiplexing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Request {
        id: String,
        method: String,
        path: String,
        headers: Option<Value>,
        body: Option<Value>,
    },
    Subscribe {
        subscription_id: String,
        channel: Channel,
        session_id: Option<String>,
        browser_profile_id: Option<String>,
        origin_metadata: Option<Value>,
    },
    Unsubscribe {
        subscription_id: String,
    },
    UploadStart {
        upload_id: String,
        project_id: String,
        session_id: String,
        filename: String,
        size: u64,
        mime_type: String,
    },
    UploadChunk {
        upload_id: String,
        offset: u64,
        #[serde(rename = "data")]
        data_b64: String,
    },
    ClientCapabilities {
        formats: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Session,
    Activity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Response {
        id: String,
        status: u16,
        headers: Option<Value>,
        body: Option<Value>,
    },
    /// Emitted immediately after a `subscribe` to a `session` channel:
    /// carries the current process snapshot plus message history so the
    /// client can render state before the first live event arrives.
    Connected {
        subscription_id: String,
        event_id: u64,
        snapshot: Value,
        history: Vec<Value>,
    },
    Event {
        subscription_id: String,
        event_id: u64,
        payload: Value,
    },
    Heartbeat {
        subscription_id: String,
    },
    UploadProgress {
        upload_id: String,
        received: u64,
        size: u64,
    },
    UploadComplete {
        upload_id: String,
        path: String,
    },
    UploadError {
        upload_id: String,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_tags_as_snake_case_type_field() {
        let msg = ClientMessage::Subscribe {
            subscription_id: "sub-1".into(),
            channel: Channel::Session,
            session_id: Some("sess-1".into()),
            browser_profile_id: None,
            origin_metadata: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["channel"], "session");
    }

    #[test]
    fn request_round_trips_through_json() {
        let msg = ClientMessage::Request {
            id: "r1".into(),
            method: "GET".into(),
            path: "/projects".into(),
            headers: None,
            body: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ClientMessage::Request { .. }));
    }

    #[test]
    fn event_message_carries_monotonic_event_id() {
        let msg = ServerMessage::Event {
            subscription_id: "sub-1".into(),
            event_id: 42,
            payload: serde_json::json!({"kind": "message"}),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event_id"], 42);
    }
}
