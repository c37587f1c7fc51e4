//! # vatp-client
//!
//! Client engine for the VATP vehicle control protocol.
//!
//! This crate provides:
//! - A session state machine shared by both roles
//! - [`AdminClient`]: CONNECT, AUTH and token-bearing drive commands
//! - [`ObserverClient`]: CONNECT and a background telemetry stream split
//!   into server messages
//! - A [`Transport`] seam with a TCP implementation whose `close` is safe
//!   while a read is pending

pub mod client;
pub mod connection;
pub mod error;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use client::{AdminClient, AdminConfig, AuthMode, Credentials};
pub use connection::{ConnectionConfig, TcpChannel, Transport};
pub use error::{ClientError, ErrorKind};
pub use session::{Phase, Session};
pub use telemetry::{
    callbacks, Callbacks, ObserverClient, TelemetryEvent, TelemetryListener, TelemetryReceiver,
};
pub use vatp_protocol::{Command, Response, Telemetry, TokenPolicy};
