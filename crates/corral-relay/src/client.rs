// SPDX-License-Identifier: Apache-2.0
//! Relay client: a single outbound WebSocket to a rendezvous server,
//! waiting to be claimed by an inbound phone connection. The connection
//! loop runs as a background `tokio::spawn` controlled via a command
//! channel, giving `start`/`stop`/update semantics without blocking the
//! caller.

use std::sync::Arc;

use corral_transport::{handle_socket, TransportContext, TungsteniteSocket, WireMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::error::RelayError;
use crate::protocol::{RelayClientControl, RelayServerControl};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    Disconnected,
    Connecting,
    Registering,
    Waiting,
    Rejected { reason: String },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub relay_url: String,
    pub username: String,
    pub install_id: String,
}

enum Control {
    Stop,
    UpdateUrl(String),
    UpdateUsername(String),
}

/// One logical rendezvous client. Cheap to clone (an `Arc` handle); the
/// actual connection loop runs in a single background task owned by
/// `driver`.
pub struct RelayClient {
    transport_ctx: TransportContext,
    state: Arc<Mutex<RelayState>>,
    config: Arc<Mutex<Option<RelayConfig>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    control_tx: Mutex<Option<mpsc::UnboundedSender<Control>>>,
}

impl RelayClient {
    pub fn new(transport_ctx: TransportContext) -> Arc<Self> {
        Arc::new(Self {
            transport_ctx,
            state: Arc::new(Mutex::new(RelayState::Disconnected)),
            config: Arc::new(Mutex::new(None)),
            driver: Mutex::new(None),
            control_tx: Mutex::new(None),
        })
    }

    /// Start (or restart, if already running) the connection loop.
    pub async fn start(self: &Arc<Self>, config: RelayConfig) {
        self.stop().await;
        *self.config.lock().await = Some(config.clone());

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        *self.control_tx.lock().await = Some(control_tx);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run(config, control_rx).await });
        *self.driver.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.control_tx.lock().await.take() {
            let _ = tx.send(Control::Stop);
        }
        if let Some(handle) = self.driver.lock().await.take() {
            let _ = handle.await;
        }
        *self.state.lock().await = RelayState::Disconnected;
        *self.config.lock().await = None;
    }

    /// Restart with a new relay URL; the existing connection is stopped and
    /// a fresh one started.
    pub async fn update_relay_url(self: &Arc<Self>, url: String) {
        let Some(mut config) = self.config.lock().await.clone() else {
            return;
        };
        config.relay_url = url;
        self.start(config).await;
    }

    /// Restart with a new username; the existing connection is stopped and
    /// a fresh one started.
    pub async fn update_username(self: &Arc<Self>, username: String) {
        let Some(mut config) = self.config.lock().await.clone() else {
            return;
        };
        config.username = username;
        self.start(config).await;
    }

    pub async fn get_state(&self) -> RelayState {
        self.state.lock().await.clone()
    }

    pub async fn is_enabled(&self) -> bool {
        self.config.lock().await.is_some()
    }

    async fn run(
        self: Arc<Self>,
        mut config: RelayConfig,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
    ) {
        let mut backoff = Backoff::new();

        loop {
            *self.state.lock().await = RelayState::Connecting;

            let outcome = tokio::select! {
                outcome = self.connect_register_and_wait_for_claim(&config, &mut backoff) => outcome,
                ctrl = control_rx.recv() => {
                    if !self.apply_control(ctrl, &mut config, &mut backoff).await {
                        return;
                    }
                    continue;
                }
            };

            match outcome {
                Ok(Some((stream, prelude))) => {
                    backoff.reset();
                    let ctx = self.transport_ctx.clone();
                    tokio::spawn(async move {
                        handle_socket(TungsteniteSocket::with_prelude(stream, prelude), "relay-claim", ctx).await;
                    });
                    // Immediately loop to open a fresh outbound connection
                    // and remain waiting for the next claim.
                }
                Ok(None) => {
                    // Clean close while waiting, unclaimed: reconnect at
                    // the base backoff rather than busy-looping.
                }
                Err(RelayError::Rejected(reason)) => {
                    warn!(reason = %reason, "relay registration rejected; not retrying");
                    *self.state.lock().await = RelayState::Rejected { reason };
                    return;
                }
                Err(e) => {
                    warn!("relay connection error: {e}");
                }
            }

            let delay = backoff.next_delay();
            *self.state.lock().await = RelayState::Disconnected;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                ctrl = control_rx.recv() => {
                    if !self.apply_control(ctrl, &mut config, &mut backoff).await {
                        return;
                    }
                }
            }
        }
    }

    async fn apply_control(
        &self,
        ctrl: Option<Control>,
        config: &mut RelayConfig,
        backoff: &mut Backoff,
    ) -> bool {
        match ctrl {
            Some(Control::Stop) | None => false,
            Some(Control::UpdateUrl(url)) => {
                config.relay_url = url;
                backoff.reset();
                true
            }
            Some(Control::UpdateUsername(name)) => {
                config.username = name;
                backoff.reset();
                true
            }
        }
    }

    /// Connect, register, and wait until either the connection closes
    /// unclaimed or a claim arrives. On a claim, returns the raw stream
    /// plus the first (already-consumed) message so the caller can replay
    /// it into the handed-off connection.
    async fn connect_register_and_wait_for_claim(
        &self,
        config: &RelayConfig,
        backoff: &mut Backoff,
    ) -> Result<
        Option<(
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
            WireMessage,
        )>,
        RelayError,
    > {
        let (mut ws, _response) = tokio_tungstenite::connect_async(&config.relay_url)
            .await
            .map_err(|e| RelayError::Connect(e.to_string()))?;

        *self.state.lock().await = RelayState::Registering;

        let register = RelayClientControl::ServerRegister {
            username: config.username.clone(),
            install_id: config.install_id.clone(),
        };
        let register_json = serde_json::to_string(&register)?;
        ws.send(tungstenite::Message::Text(register_json.into()))
            .await
            .map_err(|e| RelayError::Connect(e.to_string()))?;

        let registered_reply = match ws.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => text,
            _ => return Err(RelayError::ClosedEarly),
        };
        match serde_json::from_str::<RelayServerControl>(&registered_reply)? {
            RelayServerControl::ServerRegistered => backoff.reset(),
            RelayServerControl::ServerRejected { reason } => return Err(RelayError::Rejected(reason)),
        }

        *self.state.lock().await = RelayState::Waiting;
        info!("relay registered; waiting for a claim");

        loop {
            let Some(msg) = ws.next().await else { return Ok(None) };
            let msg = msg.map_err(|e| RelayError::Connect(e.to_string()))?;
            match msg {
                tungstenite::Message::Text(text) => {
                    if serde_json::from_str::<RelayServerControl>(&text).is_ok() {
                        continue; // relay heartbeat/control chatter
                    }
                    info!("relay connection claimed");
                    return Ok(Some((ws, WireMessage::Text(text.to_string()))));
                }
                tungstenite::Message::Close(_) => return Ok(None),
                tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
                tungstenite::Message::Binary(_) | tungstenite::Message::Frame(_) => continue,
            }
        }
    }
}
