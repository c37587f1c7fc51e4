//! Roles, drive commands and server responses.

use crate::error::ProtocolError;
use crate::PROTOCOL_NAME;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header names used by VATP frames.
pub mod headers {
    pub const USER_TYPE: &str = "User-Type";
    pub const USERNAME: &str = "Username";
    pub const PASSWORD: &str = "Password";
    pub const AUTH_TOKEN: &str = "Auth-Token";
    pub const COMMAND: &str = "Command";
}

/// Client role announced in the `User-Type` header of a CONNECT frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Read-only client receiving the telemetry stream.
    Observer,
    /// Client that authenticates and issues drive commands.
    Admin,
}

impl Role {
    /// Wire form used in the `User-Type` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Observer => "OBSERVER",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OBSERVER" => Ok(Role::Observer),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(ProtocolError::UnknownRole(s.to_string())),
        }
    }
}

/// Drive command carried in the `Command` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    SpeedUp,
    SlowDown,
    TurnLeft,
    TurnRight,
}

impl Command {
    /// Every command, in display order.
    pub const ALL: [Command; 4] = [
        Command::SpeedUp,
        Command::SlowDown,
        Command::TurnLeft,
        Command::TurnRight,
    ];

    /// Wire form used in the `Command` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SpeedUp => "SPEED_UP",
            Command::SlowDown => "SLOW_DOWN",
            Command::TurnLeft => "TURN_LEFT",
            Command::TurnRight => "TURN_RIGHT",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    /// Accepts the wire form (`SPEED_UP`) as well as spaced or dashed
    /// variants (`speed up`, `speed-up`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();

        Command::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == normalized)
            .ok_or_else(|| ProtocolError::UnknownCommand(s.to_string()))
    }
}

/// Classification of a server status token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// `RESPONSE_OK` or a `2xx` code.
    Ok,
    /// `RESPONSE_ERROR` or a `4xx`/`5xx` code.
    Error,
    /// `TELEMETRY_DATA` pushed by the server.
    Telemetry,
    /// Any other status token, kept verbatim.
    Other(String),
    /// The text did not start with a VATP status line.
    Unknown,
}

impl ResponseStatus {
    fn classify(code: &str) -> Self {
        match code {
            "RESPONSE_OK" | "OK" => ResponseStatus::Ok,
            "RESPONSE_ERROR" | "ERROR" => ResponseStatus::Error,
            "TELEMETRY_DATA" => ResponseStatus::Telemetry,
            _ => match code.parse::<u16>() {
                Ok(200..=299) => ResponseStatus::Ok,
                Ok(400..=599) => ResponseStatus::Error,
                _ => ResponseStatus::Other(code.to_string()),
            },
        }
    }
}

/// First line of a server response: `VATP/1.0 <code> <rest>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    /// Protocol tag, e.g. `VATP/1.0`.
    pub protocol: String,
    /// Status token, e.g. `RESPONSE_OK` or `200`.
    pub code: String,
    /// Remainder of the line (reason phrase or body length).
    pub rest: String,
}

/// A chunk of text received from the server.
///
/// The server's response grammar is only loosely defined, so parsing is
/// best-effort and never fails: the raw text is always available for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    raw: String,
    status_line: Option<StatusLine>,
    headers: Vec<(String, String)>,
    body: String,
}

impl Response {
    /// Parses received text into status line, headers and body.
    pub fn parse(text: &str) -> Self {
        let (head, body) = split_head(text);
        let mut lines = head.lines();

        let status_line = lines.next().and_then(parse_status_line);
        if status_line.is_none() {
            return Self {
                raw: text.to_string(),
                status_line: None,
                headers: Vec::new(),
                body: text.to_string(),
            };
        }

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
            .filter(|(name, _)| !name.is_empty())
            .collect();

        Self {
            raw: text.to_string(),
            status_line,
            headers,
            body: body.to_string(),
        }
    }

    /// Decodes received bytes, replacing invalid UTF-8 sequences.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(bytes))
    }

    /// Returns the text exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parsed first line, if the text started with one.
    pub fn status_line(&self) -> Option<&StatusLine> {
        self.status_line.as_ref()
    }

    /// Classification of the status token; `Unknown` without a status line.
    pub fn status(&self) -> ResponseStatus {
        self.status_line
            .as_ref()
            .map(|line| ResponseStatus::classify(&line.code))
            .unwrap_or(ResponseStatus::Unknown)
    }

    /// Returns whether the server reported success.
    pub fn is_ok(&self) -> bool {
        self.status() == ResponseStatus::Ok
    }

    /// Returns whether the server reported an error.
    pub fn is_error(&self) -> bool {
        self.status() == ResponseStatus::Error
    }

    /// Returns the parsed headers in the order received.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Looks up a header value by case-insensitive name (first match wins).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Text following the blank line, or the whole text when no status line
    /// was recognised.
    pub fn body(&self) -> &str {
        &self.body
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw.trim_end())
    }
}

fn split_head(text: &str) -> (&str, &str) {
    let crlf = text.find("\r\n\r\n").map(|pos| (pos, 4));
    let lf = text.find("\n\n").map(|pos| (pos, 2));

    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        Some((pos, len)) => (&text[..pos], &text[pos + len..]),
        None => (text, ""),
    }
}

pub(crate) fn parse_status_line(line: &str) -> Option<StatusLine> {
    let mut parts = line.trim().splitn(3, ' ');
    let protocol = parts.next()?;
    if !protocol.starts_with(PROTOCOL_NAME) || !protocol.contains('/') {
        return None;
    }
    Some(StatusLine {
        protocol: protocol.to_string(),
        code: parts.next().unwrap_or_default().to_string(),
        rest: parts.next().unwrap_or_default().trim().to_string(),
    })
}
