// SPDX-License-Identifier: Apache-2.0
//! Rendezvous control messages, using the same tagged-union convention as
//! `corral-auth::handshake`'s auth messages — everything that doesn't
//! parse as one of these two variants is treated as a claim.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayClientControl {
    ServerRegister { username: String, install_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayServerControl {
    ServerRegistered,
    ServerRejected { reason: String },
}
