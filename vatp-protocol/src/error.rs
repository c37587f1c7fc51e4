//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while building, encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    FrameMalformed(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("unknown user type: {0}")]
    UnknownRole(String),

    #[error("header block too large: {size} bytes (max {max})")]
    HeaderTooLarge { size: usize, max: usize },

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::FrameMalformed(reason.into())
    }

    /// Returns whether the error was caused by local input that can never be
    /// put on the wire, as opposed to bytes received from the peer.
    pub fn is_frame_malformed(&self) -> bool {
        matches!(self, ProtocolError::FrameMalformed(_))
    }
}
