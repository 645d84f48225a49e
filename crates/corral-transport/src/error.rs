// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// WebSocket close codes used by this crate, beyond the standard ones.
pub mod close_code {
    pub const UNKNOWN_VERSION: u16 = 4002;
    pub const PROTOCOL_ERROR: u16 = 4003;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("envelope shorter than the minimum frame size")]
    EnvelopeTooShort,
    #[error("unsupported envelope version: {0}")]
    UnknownVersion(u8),
    #[error("unknown inner payload format: {0}")]
    UnknownInnerFormat(u8),
    #[error("envelope decryption failed")]
    DecryptionFailed,
    #[error("malformed upload chunk frame")]
    MalformedUploadChunk,
    #[error("upload {0} offset mismatch: expected {1}, got {2}")]
    UploadOffsetMismatch(String, u64, u64),
    #[error("unknown upload id: {0}")]
    UnknownUpload(String),
    #[error("gzip payload failed to inflate: {0}")]
    GzipInflate(String),
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Auth(#[from] corral_auth::AuthError),
    #[error("connection closed before the handshake completed")]
    HandshakeClosed,
}

impl TransportError {
    /// Whether this error should close the socket outright, and with which
    /// code, versus merely being logged: every violation raises a typed
    /// parse error whose `code` determines whether to close the socket or
    /// merely warn.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            TransportError::UnknownVersion(_) => Some(close_code::UNKNOWN_VERSION),
            TransportError::EnvelopeTooShort | TransportError::UnknownInnerFormat(_) => {
                Some(close_code::PROTOCOL_ERROR)
            }
            _ => None,
        }
    }
}
