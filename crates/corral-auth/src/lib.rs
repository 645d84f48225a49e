// SPDX-License-Identifier: Apache-2.0
//! SRP-6a authentication, handshake sequencing, and resumable session
//! storage for direct (non-relayed) connections.

pub mod error;
pub mod handshake;
pub mod identity;
pub mod session_store;
pub mod srp_core;

pub use error::{AuthError, AuthErrorCode};
pub use handshake::{ClientAuthMessage, ServerAuthMessage, ServerHandshakeSession};
pub use identity::IdentityRecord;
pub use session_store::SessionStore;
