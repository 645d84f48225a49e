// SPDX-License-Identifier: Apache-2.0
//! Core error taxonomy: one `thiserror` enum per crate rather than a
//! single global error type, with a variant per failure class the
//! supervisor distinguishes when propagating faults to a transport.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("malformed frame: {0}")]
    FormatError(String),

    #[error("process has terminated: {0}")]
    Terminated(String),

    #[error("transient failure, retriable: {0}")]
    Transient(String),

    #[error("internal invariant violated: {0}")]
    Fatal(String),
}

impl CoreError {
    /// The taxonomy kind name, used by collaborators (HTTP layer, transport)
    /// to pick an HTTP status / close code.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidInput(_) => "InvalidInput",
            CoreError::NotFound(_) => "NotFound",
            CoreError::AuthRequired(_) => "AuthRequired",
            CoreError::AuthFailed(_) => "AuthFailed",
            CoreError::FormatError(_) => "FormatError",
            CoreError::Terminated(_) => "Terminated",
            CoreError::Transient(_) => "Transient",
            CoreError::Fatal(_) => "Fatal",
        }
    }
}
