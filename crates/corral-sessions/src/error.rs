// SPDX-License-Identifier: Apache-2.0
//! `TranscriptError` — one `thiserror` enum for this crate, convertible
//! into `corral_core::error::CoreError` at the boundary rather than
//! exposed as a single global error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("transcript not found: {0}")]
    NotFound(String),

    #[error("failed to read transcript {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed transcript line in {path}: {source}")]
    Malformed {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<TranscriptError> for corral_core::error::CoreError {
    fn from(err: TranscriptError) -> Self {
        match err {
            TranscriptError::NotFound(id) => corral_core::error::CoreError::NotFound(id),
            other => corral_core::error::CoreError::Fatal(other.to_string()),
        }
    }
}
