//! Client error types.

use hsmcomm_protocol::{CommError, ErrorCode};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("comm error: {0}")]
    Comm(#[from] CommError),

    #[error("request timeout")]
    Timeout,

    #[error("server error: {code}")]
    ServerError { code: ErrorCode },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Comm(e) => e.is_would_block(),
            ClientError::Timeout => true,
            ClientError::ServerError { code } => code.is_retryable(),
            ClientError::UnexpectedResponse(_) => false,
        }
    }
}
