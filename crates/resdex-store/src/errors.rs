use resdex_core::DiscoveryError;
use std::io;
use thiserror::Error;

/// Errors raised by key-value stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for DiscoveryError {
    fn from(err: StoreError) -> Self {
        DiscoveryError::Storage(err.to_string())
    }
}
