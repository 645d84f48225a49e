// SPDX-License-Identifier: Apache-2.0
//! Connection-level bridge: SRP handshake, then request/response and
//! subscription multiplexing over the framing in `envelope`/`messages`. A
//! single `tokio::select!` loop bridges the socket and an internal outbound
//! channel, generalized from axum's WebSocket type to any [`WireSocket`] so
//! the same loop drives both direct inbound connections and relay claim
//! handoffs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use corral_auth::{
    ClientAuthMessage, IdentityRecord, ServerAuthMessage, ServerHandshakeSession, SessionStore,
};
use corral_core::event_bus::EventBus;
use corral_core::model::ProcessEvent;
use corral_core::supervisor::Supervisor;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::envelope::{self, InnerFormat};
use crate::error::TransportError;
use crate::messages::{Channel, ClientMessage, ServerMessage};
use crate::subscription::{SubscriptionState, SubscriptionTable};
use crate::upload::{UploadState, UploadTable};
use crate::wire_socket::{WireMessage, WireSocket};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub type IdentityLookup = Arc<dyn Fn(&str) -> Option<IdentityRecord> + Send + Sync>;

#[derive(Clone)]
pub struct TransportContext {
    pub supervisor: Arc<Supervisor>,
    pub event_bus: EventBus,
    pub sessions: Arc<SessionStore>,
    pub identities: IdentityLookup,
    pub upload_staging_dir: PathBuf,
}

/// Drive one connection start-to-finish: SRP handshake, then the
/// multiplexed request/subscribe/upload loop, then teardown. `label` is a
/// peer address for direct connections or a relay connection id for
/// claimed ones — used only for logging.
pub async fn handle_socket(mut socket: impl WireSocket, label: &str, ctx: TransportContext) {
    info!(%label, "transport connection opened");

    let session_key = match run_handshake(&mut socket, &ctx).await {
        Ok(key) => key,
        Err(e) => {
            debug!(%label, "handshake failed: {e}");
            socket.close(1002, "handshake failed".into()).await;
            return;
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut subs = SubscriptionTable::new();
    let mut uploads = UploadTable::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WireMessage::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => handle_client_message(msg, &ctx, &event_tx, &mut subs, &mut uploads).await,
                            Err(e) => warn!(%label, "invalid client message JSON: {e}"),
                        }
                    }
                    Some(Ok(WireMessage::Binary(bytes))) => {
                        match envelope::decrypt(&session_key, &bytes) {
                            Ok(decoded) => {
                                if let Err(e) = handle_decoded_frame(decoded, &ctx, &event_tx, &mut subs, &mut uploads).await {
                                    warn!(%label, "frame handling error: {e}");
                                }
                            }
                            Err(e) => {
                                warn!(%label, "envelope parse error: {e}");
                                if let Some(code) = e.close_code() {
                                    socket.close(code, e.to_string()).await;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(WireMessage::Ping(data))) => {
                        if socket.send(WireMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WireMessage::Pong(_))) => {}
                    Some(Ok(WireMessage::Close)) | None => break,
                    Some(Err(e)) => {
                        debug!(%label, "socket recv error: {e}");
                        break;
                    }
                }
            }
            Some(out) = event_rx.recv() => {
                if send_server_message(&mut socket, &out, &session_key).await.is_err() {
                    break;
                }
            }
        }
    }

    subs.clear();
    uploads.discard_all().await;
    info!(%label, "transport connection closed");
}

/// Plaintext SRP handshake over text frames — the initial SRP messages are
/// always text. Supports both the full hello/challenge/proof flow and the
/// resume shortcut.
async fn run_handshake(
    socket: &mut impl WireSocket,
    ctx: &TransportContext,
) -> Result<[u8; 32], TransportError> {
    let mut handshake = ServerHandshakeSession::new();

    loop {
        let text = match socket.recv().await {
            Some(Ok(WireMessage::Text(text))) => text,
            Some(Ok(WireMessage::Ping(data))) => {
                let _ = socket.send(WireMessage::Pong(data)).await;
                continue;
            }
            _ => return Err(TransportError::HandshakeClosed),
        };

        let client_msg: ClientAuthMessage = serde_json::from_str(&text)?;

        if let ClientAuthMessage::Resume {
            identity,
            session_id,
            proof,
        } = &client_msg
        {
            let reply = ServerHandshakeSession::resume(identity, session_id, proof, &ctx.sessions).await?;
            send_auth_message(socket, &reply).await;
            if let ServerAuthMessage::Resumed { session_id } = &reply {
                if let Some(key) = ctx.sessions.session_key(session_id).await {
                    return Ok(key);
                }
            }
            continue;
        }

        let outcome = handshake
            .handle(client_msg, ctx.identities.as_ref(), &ctx.sessions)
            .await?;
        send_auth_message(socket, &outcome.reply).await;
        if let Some(key) = outcome.session_key {
            return Ok(key);
        }
    }
}

async fn send_auth_message(socket: &mut impl WireSocket, msg: &ServerAuthMessage) {
    if let Ok(json) = serde_json::to_string(msg) {
        let _ = socket.send(WireMessage::Text(json)).await;
    }
}

async fn handle_decoded_frame(
    decoded: envelope::DecodedEnvelope,
    ctx: &TransportContext,
    event_tx: &mpsc::UnboundedSender<ServerMessage>,
    subs: &mut SubscriptionTable,
    uploads: &mut UploadTable,
) -> Result<(), TransportError> {
    match decoded.format {
        InnerFormat::Json => {
            let msg: ClientMessage = serde_json::from_slice(&decoded.payload)?;
            handle_client_message(msg, ctx, event_tx, subs, uploads).await;
        }
        InnerFormat::GzipJson => {
            let json = envelope::gzip_decompress(&decoded.payload)?;
            let msg: ClientMessage = serde_json::from_slice(&json)?;
            handle_client_message(msg, ctx, event_tx, subs, uploads).await;
        }
        InnerFormat::UploadChunk => {
            if decoded.payload.len() < 24 {
                return Err(TransportError::MalformedUploadChunk);
            }
            // `uploadId` is carried as a 32-char lowercase hex string end to
            // end (the JSON `upload_start`/`upload_chunk` forms use the same
            // representation), so the binary chunk's raw 16 bytes round-trip
            // through `hex::encode` to the same key used at upload_start.
            let upload_id = hex::encode(&decoded.payload[0..16]);
            let offset = u64::from_be_bytes(decoded.payload[16..24].try_into().unwrap());
            let chunk = &decoded.payload[24..];
            apply_upload_chunk(uploads, &upload_id, offset, chunk, event_tx).await;
        }
    }
    Ok(())
}

async fn handle_client_message(
    msg: ClientMessage,
    ctx: &TransportContext,
    event_tx: &mpsc::UnboundedSender<ServerMessage>,
    subs: &mut SubscriptionTable,
    uploads: &mut UploadTable,
) {
    match msg {
        ClientMessage::Request { id, method, path, headers, body } => {
            let _ = (headers, body);
            let _ = event_tx.send(ServerMessage::Response {
                id,
                status: 501,
                headers: None,
                body: Some(serde_json::json!({
                    "error": format!("no local HTTP handler wired for {method} {path}"),
                })),
            });
        }
        ClientMessage::Subscribe { subscription_id, channel, session_id, .. } => {
            start_subscription(subscription_id, channel, session_id, ctx, event_tx, subs).await;
        }
        ClientMessage::Unsubscribe { subscription_id } => {
            subs.remove(&subscription_id);
        }
        ClientMessage::UploadStart { upload_id, project_id, session_id, filename, size, mime_type } => {
            match UploadState::create(&upload_id, &ctx.upload_staging_dir, project_id, session_id, filename, size, mime_type).await {
                Ok(state) => uploads.insert(upload_id, state),
                Err(e) => {
                    let _ = event_tx.send(ServerMessage::UploadError { upload_id, message: e.to_string() });
                }
            }
        }
        ClientMessage::UploadChunk { upload_id, offset, data_b64 } => {
            use base64::Engine;
            match base64::engine::general_purpose::STANDARD.decode(data_b64) {
                Ok(chunk) => apply_upload_chunk(uploads, &upload_id, offset, &chunk, event_tx).await,
                Err(e) => {
                    let _ = event_tx.send(ServerMessage::UploadError { upload_id, message: e.to_string() });
                }
            }
        }
        ClientMessage::ClientCapabilities { .. } => {}
    }
}

async fn apply_upload_chunk(
    uploads: &mut UploadTable,
    upload_id: &str,
    offset: u64,
    chunk: &[u8],
    event_tx: &mpsc::UnboundedSender<ServerMessage>,
) {
    let Some(state) = uploads.get_mut(upload_id) else {
        let _ = event_tx.send(ServerMessage::UploadError {
            upload_id: upload_id.to_string(),
            message: "unknown upload id".into(),
        });
        return;
    };

    match state.write_chunk(offset, chunk).await {
        Ok(()) => {
            let received = state.received;
            let size = state.size;
            if state.is_complete() {
                let path = state.dest_path.display().to_string();
                uploads.remove(upload_id);
                let _ = event_tx.send(ServerMessage::UploadComplete {
                    upload_id: upload_id.to_string(),
                    path,
                });
            } else {
                let _ = event_tx.send(ServerMessage::UploadProgress {
                    upload_id: upload_id.to_string(),
                    received,
                    size,
                });
            }
        }
        Err(e) => {
            if let Some(state) = uploads.remove(upload_id) {
                state.discard().await;
            }
            let _ = event_tx.send(ServerMessage::UploadError {
                upload_id: upload_id.to_string(),
                message: e.to_string(),
            });
        }
    }
}

async fn start_subscription(
    subscription_id: String,
    channel: Channel,
    session_id: Option<String>,
    ctx: &TransportContext,
    event_tx: &mpsc::UnboundedSender<ServerMessage>,
    subs: &mut SubscriptionTable,
) {
    let mut state = SubscriptionState::new();

    match channel {
        Channel::Session => {
            let Some(session_id) = session_id else {
                let _ = event_tx.send(ServerMessage::Error {
                    code: "invalid_subscribe".into(),
                    message: "session channel requires sessionId".into(),
                });
                return;
            };
            let Some(process) = ctx.supervisor.get_process_for_session(&session_id).await else {
                let _ = event_tx.send(ServerMessage::Error {
                    code: "not_found".into(),
                    message: format!("no active process for session {session_id}"),
                });
                return;
            };

            let snapshot = serde_json::json!({
                "sessionId": process.session_id().await,
                "state": process.state().await,
                "mode": process.mode().await,
                "modeVersion": process.mode_version(),
            });
            let history: Vec<serde_json::Value> = process
                .get_message_history()
                .await
                .iter()
                .map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null))
                .collect();

            let event_id = state.next_event_id();
            let _ = event_tx.send(ServerMessage::Connected {
                subscription_id: subscription_id.clone(),
                event_id,
                snapshot,
                history,
            });

            let sub_id_for_task = subscription_id.clone();
            let tx = event_tx.clone();
            let task = tokio::spawn(async move {
                let mut subscription = process.subscribe().await;
                let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
                heartbeat.tick().await;
                let mut next_event_id: u64 = 1;
                loop {
                    tokio::select! {
                        event = subscription.rx.recv() => {
                            let Some(event) = event else { break };
                            let payload = process_event_payload(event);
                            if tx.send(ServerMessage::Event {
                                subscription_id: sub_id_for_task.clone(),
                                event_id: next_event_id,
                                payload,
                            }).is_err() {
                                break;
                            }
                            next_event_id += 1;
                        }
                        _ = heartbeat.tick() => {
                            if tx.send(ServerMessage::Heartbeat { subscription_id: sub_id_for_task.clone() }).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
            state.task = Some(task);
        }
        Channel::Activity => {
            let mut rx = ctx.event_bus.subscribe();
            let sub_id_for_task = subscription_id.clone();
            let tx = event_tx.clone();
            let task = tokio::spawn(async move {
                let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
                heartbeat.tick().await;
                let mut next_event_id: u64 = 0;
                loop {
                    tokio::select! {
                        event = rx.recv() => {
                            match event {
                                Ok(event) => {
                                    let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
                                    if tx.send(ServerMessage::Event {
                                        subscription_id: sub_id_for_task.clone(),
                                        event_id: next_event_id,
                                        payload,
                                    }).is_err() {
                                        break;
                                    }
                                    next_event_id += 1;
                                }
                                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                            }
                        }
                        _ = heartbeat.tick() => {
                            if tx.send(ServerMessage::Heartbeat { subscription_id: sub_id_for_task.clone() }).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
            state.task = Some(task);
        }
    }

    subs.insert(subscription_id, state);
}

fn process_event_payload(event: ProcessEvent) -> serde_json::Value {
    serde_json::to_value(&event).unwrap_or(serde_json::Value::Null)
}

async fn send_server_message(
    socket: &mut impl WireSocket,
    msg: &ServerMessage,
    session_key: &[u8; 32],
) -> std::io::Result<()> {
    let json = serde_json::to_vec(msg).expect("ServerMessage always serializes");
    let envelope = envelope::encrypt(session_key, InnerFormat::Json, &json);
    socket.send(WireMessage::Binary(envelope)).await
}
