//! # vatp-protocol
//!
//! Wire protocol implementation for VATP (Vehicle Autonomous Transport Protocol).
//!
//! This crate provides:
//! - Text framing: request line, ordered header lines, blank terminator
//! - Incremental frame decoding from a byte buffer
//! - Lenient parsing of server responses (raw text is always kept)
//! - Role, method and drive command enumerations
//! - Session token extraction from AUTH responses
//! - Typed telemetry snapshots

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;
pub mod telemetry;
pub mod token;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{Frame, FrameBuilder, Method};
pub use message::{headers, Command, Response, ResponseStatus, Role, StatusLine};
pub use telemetry::{BatteryLevel, Telemetry};
pub use token::{extract_token, TokenPolicy, TOKEN_MARKER};

/// Protocol name carried on every request line.
pub const PROTOCOL_NAME: &str = "VATP";

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Default port for the vehicle server.
pub const DEFAULT_PORT: u16 = 8080;

/// Line terminator used by the wire format.
pub const CRLF: &str = "\r\n";

/// Maximum accepted size of a frame header block (64 KiB).
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Maximum body length accepted from a request line (1 MiB).
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Returns the `"VATP/1.0"` protocol tag.
pub fn protocol_tag() -> String {
    format!("{PROTOCOL_NAME}/{PROTOCOL_VERSION}")
}
