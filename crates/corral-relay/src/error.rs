// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay connect failed: {0}")]
    Connect(String),
    #[error("relay registration rejected: {0}")]
    Rejected(String),
    #[error("relay connection closed unexpectedly")]
    ClosedEarly,
    #[error("malformed relay control message: {0}")]
    Protocol(#[from] serde_json::Error),
}
