// SPDX-License-Identifier: Apache-2.0
//! Outbound relay client: rendezvous registration, exponential backoff,
//! and handoff of claimed connections into the secure transport machinery.

pub mod backoff;
pub mod client;
pub mod error;
pub mod protocol;

pub use backoff::Backoff;
pub use client::{RelayClient, RelayConfig, RelayState};
pub use error::RelayError;
