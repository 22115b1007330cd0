//! Error types and response status codes.

use crate::HEADER_LEN;
use std::fmt;
use thiserror::Error;

/// Errors reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("operation would block")]
    WouldBlock,

    #[error("transport not ready")]
    NotReady,

    #[error("connection closed by peer")]
    Closed,

    #[error("packet too large: {size} bytes (max {max})")]
    PacketTooLarge { size: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Returns whether the operation may simply be retried later.
    pub fn is_would_block(&self) -> bool {
        match self {
            TransportError::WouldBlock => true,
            TransportError::Io(e) => e.kind() == std::io::ErrorKind::WouldBlock,
            _ => false,
        }
    }
}

/// Errors returned by the client and server comm contexts.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("comm context not initialized")]
    NotInitialized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no data available")]
    NoData,

    #[error("transport busy")]
    Busy,

    #[error("transport error: {0}")]
    Transport(TransportError),

    #[error("protocol mismatch: magic {magic:#06x}")]
    ProtocolMismatch { magic: u16 },

    #[error("truncated packet: {len} bytes (header is {HEADER_LEN})")]
    TruncatedPacket { len: usize },

    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
}

impl CommError {
    /// Maps a transport failure on the send path.
    pub fn from_send(err: TransportError) -> Self {
        if err.is_would_block() {
            CommError::Busy
        } else {
            CommError::Transport(err)
        }
    }

    /// Maps a transport failure on the receive path.
    pub fn from_recv(err: TransportError) -> Self {
        if err.is_would_block() {
            CommError::NoData
        } else {
            CommError::Transport(err)
        }
    }

    /// Returns whether this is a retry signal rather than a failure.
    pub fn is_would_block(&self) -> bool {
        matches!(self, CommError::NoData | CommError::Busy)
    }

    /// Returns whether the session must be cleaned up and re-initialized.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommError::Transport(_))
    }

    /// Integer code for callers that work with integer returns. Never 0.
    pub fn code(&self) -> i32 {
        match self {
            CommError::NotInitialized => -400,
            CommError::InvalidArgument(_) => -401,
            CommError::NoData | CommError::Busy => -402,
            CommError::Transport(_) => -403,
            CommError::ProtocolMismatch { .. } => -404,
            CommError::TruncatedPacket { .. } => -405,
            CommError::ProtocolViolation(_) => -406,
        }
    }
}

/// Status codes carried in the `aux` field of a response.
///
/// These codes are part of the wire contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Ok = 0,
    BadRequest = 1,
    UnsupportedType = 2,
    BufferTooSmall = 3,
    Internal = 4,
    NotReady = 5,
    Aborted = 6,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Decodes a status value. Unknown values map to `Internal`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => ErrorCode::Ok,
            1 => ErrorCode::BadRequest,
            2 => ErrorCode::UnsupportedType,
            3 => ErrorCode::BufferTooSmall,
            4 => ErrorCode::Internal,
            5 => ErrorCode::NotReady,
            6 => ErrorCode::Aborted,
            _ => ErrorCode::Internal,
        }
    }

    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }

    /// Returns whether a request failing with this code may be resent.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCode::NotReady | ErrorCode::Aborted)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Ok => write!(f, "OK"),
            ErrorCode::BadRequest => write!(f, "BAD_REQUEST"),
            ErrorCode::UnsupportedType => write!(f, "UNSUPPORTED_TYPE"),
            ErrorCode::BufferTooSmall => write!(f, "BUFFER_TOO_SMALL"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
            ErrorCode::NotReady => write!(f, "NOT_READY"),
            ErrorCode::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_would_block_mapping() {
        assert!(matches!(
            CommError::from_send(TransportError::WouldBlock),
            CommError::Busy
        ));
        assert!(matches!(
            CommError::from_recv(TransportError::WouldBlock),
            CommError::NoData
        ));

        let io = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        assert!(matches!(
            CommError::from_recv(TransportError::Io(io)),
            CommError::NoData
        ));

        let err = CommError::from_recv(TransportError::Closed);
        assert!(err.is_fatal());
        assert!(!err.is_would_block());
    }

    #[test]
    fn test_error_codes_nonzero() {
        let errors = [
            CommError::NotInitialized,
            CommError::InvalidArgument("x".to_string()),
            CommError::NoData,
            CommError::Busy,
            CommError::Transport(TransportError::Closed),
            CommError::ProtocolMismatch { magic: 0 },
            CommError::TruncatedPacket { len: 3 },
            CommError::ProtocolViolation("x"),
        ];
        for err in &errors {
            assert!(err.code() < 0, "{err} has code {}", err.code());
        }
        assert_eq!(CommError::NoData.code(), CommError::Busy.code());
    }

    #[test]
    fn test_status_roundtrip() {
        for code in [
            ErrorCode::Ok,
            ErrorCode::BadRequest,
            ErrorCode::UnsupportedType,
            ErrorCode::BufferTooSmall,
            ErrorCode::Internal,
            ErrorCode::NotReady,
            ErrorCode::Aborted,
        ] {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), code);
        }
        assert_eq!(ErrorCode::from_u16(0xFFFF), ErrorCode::Internal);
        assert!(ErrorCode::Ok.is_ok());
        assert!(!ErrorCode::BadRequest.is_ok());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ErrorCode::Ok.to_string(), "OK");
        assert_eq!(ErrorCode::UnsupportedType.to_string(), "UNSUPPORTED_TYPE");
        assert_eq!(ErrorCode::BufferTooSmall.to_string(), "BUFFER_TOO_SMALL");
    }

    #[test]
    fn test_error_display() {
        let err = CommError::ProtocolMismatch { magic: 0xA502 };
        assert!(err.to_string().contains("0xa502"));

        let err = CommError::TruncatedPacket { len: 3 };
        assert!(err.to_string().contains('3'));

        let err = TransportError::PacketTooLarge {
            size: 2000,
            max: 1288,
        };
        assert!(err.to_string().contains("2000"));
    }
}
