// SPDX-License-Identifier: Apache-2.0
//! Secure WebSocket transport: SRP handshake over plaintext text frames,
//! then binary encrypted envelopes carrying request/response, subscription,
//! and upload traffic.

pub mod connection;
pub mod envelope;
pub mod error;
pub mod messages;
pub mod subscription;
pub mod upload;
pub mod wire_socket;

pub use connection::{handle_socket, IdentityLookup, TransportContext};
pub use error::TransportError;
pub use wire_socket::{AxumSocket, TungsteniteSocket, WireMessage, WireSocket};
