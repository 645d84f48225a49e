// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Wire-level error codes surfaced to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorCode {
    InvalidIdentity,
    InvalidProof,
    ServerError,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),
    #[error("SRP proof verification failed")]
    InvalidProof,
    #[error("session resume rejected: {0}")]
    InvalidResume(String),
    #[error("SRP messages received out of order: expected {expected}, got {got}")]
    OutOfOrder { expected: &'static str, got: &'static str },
    #[error("io error persisting auth state: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> AuthErrorCode {
        match self {
            AuthError::UnknownIdentity(_) => AuthErrorCode::InvalidIdentity,
            AuthError::InvalidProof | AuthError::InvalidResume(_) => AuthErrorCode::InvalidProof,
            AuthError::OutOfOrder { .. } | AuthError::Io(_) | AuthError::Internal(_) => {
                AuthErrorCode::ServerError
            }
        }
    }
}

impl From<AuthError> for corral_core::error::CoreError {
    fn from(err: AuthError) -> Self {
        use corral_core::error::CoreError;
        match err {
            AuthError::UnknownIdentity(_) | AuthError::InvalidProof | AuthError::InvalidResume(_) => {
                CoreError::AuthFailed(err.to_string())
            }
            AuthError::OutOfOrder { .. } => CoreError::FormatError(err.to_string()),
            AuthError::Io(_) => CoreError::Transient(err.to_string()),
            AuthError::Internal(_) => CoreError::Fatal(err.to_string()),
        }
    }
}
