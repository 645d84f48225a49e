// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unknown agent family: {0}")]
    UnknownFamily(String),
    #[error("failed to spawn adapter subprocess: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("adapter rejected start options: {0}")]
    InvalidOptions(String),
}

impl From<AdapterError> for corral_core::error::CoreError {
    fn from(err: AdapterError) -> Self {
        corral_core::error::CoreError::Fatal(err.to_string())
    }
}
