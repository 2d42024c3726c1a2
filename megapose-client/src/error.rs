//! Client error types.

use megapose_protocol::{MessageCode, ProtocolError};
use std::fmt;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    #[error("unexpected message from server: expected {expected}, got {received}")]
    UnexpectedMessage {
        expected: MessageCode,
        received: String,
    },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server error: {message}")]
    ServerError { message: String },
}

/// Coarse failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller precondition was violated; nothing was sent.
    InvalidValue,
    /// The connection failed or a read/write did not complete.
    Io,
    /// The peer sent something this client does not accept.
    ProtocolViolation,
    /// The peer answered with an error frame.
    Server,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidValue => write!(f, "INVALID_VALUE"),
            ErrorKind::Io => write!(f, "IO"),
            ErrorKind::ProtocolViolation => write!(f, "PROTOCOL_VIOLATION"),
            ErrorKind::Server => write!(f, "SERVER"),
        }
    }
}

impl ClientError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ClientError::InvalidValue(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidValue(_) => ErrorKind::InvalidValue,
            ClientError::Io(_)
            | ClientError::ConnectionClosed
            | ClientError::Timeout
            | ClientError::NotConnected => ErrorKind::Io,
            ClientError::UnexpectedMessage { .. }
            | ClientError::Protocol(_)
            | ClientError::InvalidResponse(_)
            | ClientError::Json(_) => ErrorKind::ProtocolViolation,
            ClientError::ServerError { .. } => ErrorKind::Server,
        }
    }

    /// Returns whether the connection can no longer be trusted after this error.
    ///
    /// Server errors and malformed result documents arrive in complete frames,
    /// so the stream stays aligned. Everything on the I/O path, an unexpected
    /// code, or a codec failure leaves it in an unknown state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::ConnectionClosed
                | ClientError::Timeout
                | ClientError::NotConnected
                | ClientError::UnexpectedMessage { .. }
                | ClientError::Protocol(_)
        )
    }
}
