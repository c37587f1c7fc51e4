//! Client error types.

use crate::session::Phase;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;
use vatp_protocol::{Method, ProtocolError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not connect to {addr}: {source}")]
    ConnectionRefused {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("authentication failed: no token in AUTH response")]
    AuthFailed,

    #[error("not authenticated: {0} requires a session token")]
    NotAuthenticated(Method),

    #[error("connection closed by peer")]
    PeerClosed,

    #[error("{method} is not allowed in phase {phase}")]
    InvalidState { method: Method, phase: Phase },

    #[error("request timeout")]
    Timeout,
}

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConnectionRefused,
    TransportError,
    FrameMalformed,
    AuthFailed,
    NotAuthenticated,
    PeerClosed,
    InvalidState,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConnectionRefused => "connection refused",
            ErrorKind::TransportError => "transport error",
            ErrorKind::FrameMalformed => "frame malformed",
            ErrorKind::AuthFailed => "auth failed",
            ErrorKind::NotAuthenticated => "not authenticated",
            ErrorKind::PeerClosed => "peer closed",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

impl ClientError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            ClientError::Io(_) => ErrorKind::TransportError,
            ClientError::Protocol(ProtocolError::Io(_)) => ErrorKind::TransportError,
            ClientError::Protocol(_) => ErrorKind::FrameMalformed,
            ClientError::AuthFailed => ErrorKind::AuthFailed,
            ClientError::NotAuthenticated(_) => ErrorKind::NotAuthenticated,
            ClientError::PeerClosed => ErrorKind::PeerClosed,
            ClientError::InvalidState { .. } => ErrorKind::InvalidState,
            ClientError::Timeout => ErrorKind::Timeout,
        }
    }

    /// Returns whether the error ended the session's connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::TransportError
                | ErrorKind::PeerClosed
                | ErrorKind::Timeout
        )
    }
}
