// SPDX-License-Identifier: Apache-2.0
//! Transport-agnostic socket abstraction so the multiplexing loop in
//! `connection` runs the same way over an axum HTTP-upgrade WebSocket
//! (direct inbound connections) and over a `tokio-tungstenite` client
//! stream (a relay connection handed off to this transport machinery as a
//! fresh inbound connection once claimed). Those two libraries use
//! distinct `Message` enums for the same wire concept, so this crate
//! normalizes to one.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};

#[derive(Debug, Clone)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[async_trait]
pub trait WireSocket: Send {
    async fn recv(&mut self) -> Option<std::io::Result<WireMessage>>;
    async fn send(&mut self, msg: WireMessage) -> std::io::Result<()>;
    async fn close(&mut self, code: u16, reason: String);
}

fn io_err(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

pub struct AxumSocket(pub axum::extract::ws::WebSocket);

#[async_trait]
impl WireSocket for AxumSocket {
    async fn recv(&mut self) -> Option<std::io::Result<WireMessage>> {
        use axum::extract::ws::Message;
        match self.0.recv().await {
            Some(Ok(Message::Text(t))) => Some(Ok(WireMessage::Text(t.to_string()))),
            Some(Ok(Message::Binary(b))) => Some(Ok(WireMessage::Binary(b.to_vec()))),
            Some(Ok(Message::Ping(p))) => Some(Ok(WireMessage::Ping(p.to_vec()))),
            Some(Ok(Message::Pong(p))) => Some(Ok(WireMessage::Pong(p.to_vec()))),
            Some(Ok(Message::Close(_))) => Some(Ok(WireMessage::Close)),
            Some(Err(e)) => Some(Err(io_err(e))),
            None => None,
        }
    }

    async fn send(&mut self, msg: WireMessage) -> std::io::Result<()> {
        use axum::extract::ws::Message;
        let m = match msg {
            WireMessage::Text(t) => Message::Text(t.into()),
            WireMessage::Binary(b) => Message::Binary(b.into()),
            WireMessage::Ping(p) => Message::Ping(p.into()),
            WireMessage::Pong(p) => Message::Pong(p.into()),
            WireMessage::Close => Message::Close(None),
        };
        self.0.send(m).await.map_err(io_err)
    }

    async fn close(&mut self, code: u16, reason: String) {
        use axum::extract::ws::{CloseFrame, Message};
        let _ = self
            .0
            .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
            .await;
    }
}

/// Wraps a `tokio-tungstenite` stream of any underlying transport (plain
/// TCP or TLS), used for relay-claimed connections. `prelude` replays a
/// message the relay client already pulled off the stream while detecting
/// the claim, before `recv` resumes reading live frames.
pub struct TungsteniteSocket<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    inner: tokio_tungstenite::WebSocketStream<S>,
    prelude: Option<WireMessage>,
}

impl<S> TungsteniteSocket<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    pub fn new(inner: tokio_tungstenite::WebSocketStream<S>) -> Self {
        Self { inner, prelude: None }
    }

    pub fn with_prelude(inner: tokio_tungstenite::WebSocketStream<S>, prelude: WireMessage) -> Self {
        Self { inner, prelude: Some(prelude) }
    }
}

#[async_trait]
impl<S> WireSocket for TungsteniteSocket<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Option<std::io::Result<WireMessage>> {
        if let Some(msg) = self.prelude.take() {
            return Some(Ok(msg));
        }
        use tungstenite::Message;
        match self.inner.next().await {
            Some(Ok(Message::Text(t))) => Some(Ok(WireMessage::Text(t.to_string()))),
            Some(Ok(Message::Binary(b))) => Some(Ok(WireMessage::Binary(b.to_vec()))),
            Some(Ok(Message::Ping(p))) => Some(Ok(WireMessage::Ping(p.to_vec()))),
            Some(Ok(Message::Pong(p))) => Some(Ok(WireMessage::Pong(p.to_vec()))),
            Some(Ok(Message::Close(_))) => Some(Ok(WireMessage::Close)),
            Some(Ok(Message::Frame(_))) => None,
            Some(Err(e)) => Some(Err(io_err(e))),
            None => None,
        }
    }

    async fn send(&mut self, msg: WireMessage) -> std::io::Result<()> {
        use tungstenite::Message;
        let m = match msg {
            WireMessage::Text(t) => Message::Text(t.into()),
            WireMessage::Binary(b) => Message::Binary(b.into()),
            WireMessage::Ping(p) => Message::Ping(p.into()),
            WireMessage::Pong(p) => Message::Pong(p.into()),
            WireMessage::Close => Message::Close(None),
        };
        self.inner.send(m).await.map_err(io_err)
    }

    async fn close(&mut self, code: u16, reason: String) {
        use tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
        let _ = self
            .inner
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            }))
            .await;
    }
}
