//! Server error types.

use crate::config::ConfigError;
use hsmcomm_protocol::CommError;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("comm error: {0}")]
    Comm(#[from] CommError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ServerError {
    /// Returns whether nothing was ready and the caller should poll later.
    pub fn is_would_block(&self) -> bool {
        matches!(self, ServerError::Comm(e) if e.is_would_block())
    }

    /// Returns whether the comm session must be cleaned up and re-initialized.
    pub fn is_fatal(&self) -> bool {
        match self {
            ServerError::Comm(e) => e.is_fatal() || matches!(e, CommError::NotInitialized),
            ServerError::Config(_) => true,
        }
    }
}
