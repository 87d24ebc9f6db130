use std::fmt;

use gpgbridge_frame::FrameError;
use serde::{Deserialize, Serialize};

/// Stable classification of every failure a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A required argument was missing or empty.
    IncompleteRequest,
    /// A payload exceeded the configured ceiling.
    OversizedPayload,
    /// The engine reported that the operation failed.
    GnupgError,
    /// The operation was pending or issued after the connection closed.
    ConnectionClosed,
    /// The engine could not be reached when the connection was set up.
    ConnectionError,
    /// The chunk stream or envelope received from the engine was malformed.
    ProtocolViolation,
}

impl ErrorCode {
    /// Wire/display name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncompleteRequest => "INCOMPLETE_REQUEST",
            Self::OversizedPayload => "OVERSIZED_PAYLOAD",
            Self::GnupgError => "GNUPG_ERROR",
            Self::ConnectionClosed => "CONNECTION_CLOSED",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::ProtocolViolation => "PROTOCOL_VIOLATION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A required argument was missing or empty.
    #[error("incomplete request: missing {0}")]
    IncompleteRequest(&'static str),

    /// The payload exceeds the configured ceiling.
    #[error("payload too large ({size} bytes, max {max})")]
    OversizedPayload { size: usize, max: usize },

    /// The engine rejected the operation.
    #[error("engine error: {message}")]
    Gnupg {
        /// Numeric error value reported by the engine, if any.
        code: Option<u32>,
        /// Diagnostic text reported by the engine.
        message: String,
    },

    /// The connection is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The engine or its transport could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The engine sent something that does not follow the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl ClientError {
    /// Classification of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::IncompleteRequest(_) => ErrorCode::IncompleteRequest,
            Self::OversizedPayload { .. } => ErrorCode::OversizedPayload,
            Self::Gnupg { .. } => ErrorCode::GnupgError,
            Self::ConnectionClosed => ErrorCode::ConnectionClosed,
            Self::Connection(_) => ErrorCode::ConnectionError,
            Self::ProtocolViolation(_) => ErrorCode::ProtocolViolation,
        }
    }

    /// Numeric error value supplied by the engine, for engine failures.
    pub fn engine_code(&self) -> Option<u32> {
        match self {
            Self::Gnupg { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns true if the connection cannot be used after this error.
    ///
    /// Every other error leaves the connection open for further calls.
    pub fn is_connection_terminal(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Connection(_))
    }
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        if err.is_protocol_violation() {
            return Self::ProtocolViolation(err.to_string());
        }
        match err {
            FrameError::MessageTooLarge { size, max } | FrameError::PayloadTooLarge { size, max } => {
                Self::OversizedPayload { size, max }
            }
            FrameError::Io(_) | FrameError::ConnectionClosed => Self::ConnectionClosed,
            other => Self::ProtocolViolation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
