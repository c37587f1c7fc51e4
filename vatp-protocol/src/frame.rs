//! Text frame format for VATP.
//!
//! Frame layout:
//!
//! ```text
//! VATP/1.0 <METHOD> <body_length>\r\n
//! <Name>: <Value>\r\n          (zero or more, in insertion order)
//! \r\n
//! <body_length bytes of body>
//! ```
//!
//! No escaping is defined for header text, so names and values containing
//! CR or LF are rejected when the frame is built.

use crate::error::ProtocolError;
use crate::message::{headers, Command, Role};
use crate::{protocol_tag, CRLF, MAX_BODY_SIZE, MAX_HEADER_SIZE, PROTOCOL_NAME};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::str::FromStr;

pub(crate) const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Connect,
    Auth,
    Command,
    Disconnect,
    GetTelemetry,
    ListUsers,
}

impl Method {
    /// Wire name used on the request line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Connect => "CONNECT",
            Method::Auth => "AUTH",
            Method::Command => "COMMAND",
            Method::Disconnect => "DISCONNECT",
            Method::GetTelemetry => "GET_TELEMETRY",
            Method::ListUsers => "LIST_USERS",
        }
    }

    /// Returns whether frames of this method must carry an `Auth-Token`.
    pub fn requires_token(&self) -> bool {
        matches!(self, Method::Command | Method::ListUsers)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Method::Connect),
            "AUTH" => Ok(Method::Auth),
            "COMMAND" => Ok(Method::Command),
            "DISCONNECT" => Ok(Method::Disconnect),
            "GET_TELEMETRY" => Ok(Method::GetTelemetry),
            "LIST_USERS" => Ok(Method::ListUsers),
            _ => Err(ProtocolError::UnknownMethod(s.to_string())),
        }
    }
}

/// A validated VATP request frame.
///
/// Frames are immutable once built; use [`Frame::builder`] or one of the
/// request constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    method: Method,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Frame {
    /// Starts building a frame for the given method.
    pub fn builder(method: Method) -> FrameBuilder {
        FrameBuilder {
            method,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// CONNECT announcing the role; the password is sent only when given.
    pub fn connect(
        role: Role,
        username: &str,
        password: Option<&str>,
    ) -> Result<Self, ProtocolError> {
        let mut builder = Self::builder(Method::Connect)
            .header(headers::USER_TYPE, role.as_str())
            .header(headers::USERNAME, username);
        if let Some(password) = password {
            builder = builder.header(headers::PASSWORD, password);
        }
        builder.build()
    }

    /// AUTH with the ADMIN credentials.
    pub fn auth(username: &str, password: &str) -> Result<Self, ProtocolError> {
        Self::builder(Method::Auth)
            .header(headers::USERNAME, username)
            .header(headers::PASSWORD, password)
            .build()
    }

    /// COMMAND carrying the session token and a drive command.
    pub fn command(username: &str, token: &str, command: Command) -> Result<Self, ProtocolError> {
        Self::builder(Method::Command)
            .header(headers::USERNAME, username)
            .header(headers::AUTH_TOKEN, token)
            .header(headers::COMMAND, command.as_str())
            .build()
    }

    /// LIST_USERS carrying the session token.
    pub fn list_users(username: &str, token: &str) -> Result<Self, ProtocolError> {
        Self::builder(Method::ListUsers)
            .header(headers::USERNAME, username)
            .header(headers::AUTH_TOKEN, token)
            .build()
    }

    /// GET_TELEMETRY for a one-shot snapshot.
    pub fn get_telemetry(username: &str) -> Result<Self, ProtocolError> {
        Self::builder(Method::GetTelemetry)
            .header(headers::USERNAME, username)
            .build()
    }

    /// DISCONNECT for the given user.
    pub fn disconnect(username: &str) -> Result<Self, ProtocolError> {
        Self::builder(Method::Disconnect)
            .header(headers::USERNAME, username)
            .build()
    }

    /// Returns the request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the body length announced on the request line.
    pub fn body_length(&self) -> usize {
        self.body.len()
    }

    /// Returns the body bytes (empty for every client request).
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the first header with the given (exact) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the number of bytes [`Frame::encode`] will produce.
    pub fn encoded_len(&self) -> usize {
        let request_line =
            protocol_tag().len() + 1 + self.method.as_str().len() + 1 + digits(self.body.len()) + 2;
        let header_lines: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.len() + 2 + value.len() + 2)
            .sum();
        request_line + header_lines + 2 + self.body.len()
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        // Request line
        buf.put_slice(protocol_tag().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.body.len().to_string().as_bytes());
        buf.put_slice(CRLF.as_bytes());

        // Header lines
        for (name, value) in &self.headers {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(CRLF.as_bytes());
        }

        // End of headers
        buf.put_slice(CRLF.as_bytes());

        buf.put_slice(&self.body);
        buf
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        let Some(head_len) = find(&buf[..], HEADER_TERMINATOR) else {
            if buf.len() > MAX_HEADER_SIZE {
                return Err(ProtocolError::HeaderTooLarge {
                    size: buf.len(),
                    max: MAX_HEADER_SIZE,
                });
            }
            return Ok(None);
        };

        let head = std::str::from_utf8(&buf[..head_len]).map_err(|_| ProtocolError::InvalidUtf8)?;
        let mut lines = head.split(CRLF);

        let request_line = lines.next().unwrap_or_default();
        let (method, body_length) = parse_request_line(request_line)?;

        let mut headers = Vec::new();
        for line in lines {
            headers.push(parse_header_line(line)?);
        }

        let total_len = (head_len + HEADER_TERMINATOR.len())
            .checked_add(body_length)
            .ok_or_else(|| ProtocolError::malformed("body length overflows"))?;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(head_len + HEADER_TERMINATOR.len());
        let body = buf.split_to(body_length).freeze();

        Ok(Some(Self {
            method,
            headers,
            body,
        }))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.body.len())?;
        for (name, value) in &self.headers {
            // Credentials never end up in logs
            let shown = match name.as_str() {
                headers::PASSWORD | headers::AUTH_TOKEN => "***",
                _ => value.as_str(),
            };
            write!(f, " {name}={shown}")?;
        }
        Ok(())
    }
}

/// Builder that validates header text before a [`Frame`] exists.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    method: Method,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl FrameBuilder {
    /// Appends a header; order is preserved on the wire.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body; its length goes on the request line.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Validates the headers and produces the frame.
    pub fn build(self) -> Result<Frame, ProtocolError> {
        for (name, value) in &self.headers {
            validate_header(name, value)?;
        }
        Ok(Frame {
            method: self.method,
            headers: self.headers,
            body: self.body,
        })
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::malformed("empty header name"));
    }
    if name.contains(':') {
        return Err(ProtocolError::malformed(format!(
            "header name {name:?} contains ':'"
        )));
    }
    if has_line_break(name) {
        return Err(ProtocolError::malformed(format!(
            "header name {name:?} contains CR/LF"
        )));
    }
    if has_line_break(value) {
        return Err(ProtocolError::malformed(format!(
            "value of header {name:?} contains CR/LF"
        )));
    }
    Ok(())
}

fn has_line_break(text: &str) -> bool {
    text.contains(['\r', '\n'])
}

fn parse_request_line(line: &str) -> Result<(Method, usize), ProtocolError> {
    let parts: Vec<&str> = line.split(' ').collect();
    let [tag, method, length] = parts.as_slice() else {
        return Err(ProtocolError::malformed(format!(
            "bad request line {line:?}"
        )));
    };

    if *tag != protocol_tag() {
        return Err(if tag.starts_with(PROTOCOL_NAME) {
            ProtocolError::UnsupportedVersion(tag.to_string())
        } else {
            ProtocolError::malformed(format!("bad protocol tag {tag:?}"))
        });
    }

    let method = method.parse()?;
    let body_length: usize = length
        .parse()
        .map_err(|_| ProtocolError::malformed(format!("bad body length {length:?}")))?;
    if body_length > MAX_BODY_SIZE {
        return Err(ProtocolError::BodyTooLarge {
            size: body_length,
            max: MAX_BODY_SIZE,
        });
    }

    Ok((method, body_length))
}

fn parse_header_line(line: &str) -> Result<(String, String), ProtocolError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| ProtocolError::malformed(format!("header line {line:?} has no ':'")))?;
    if name.is_empty() {
        return Err(ProtocolError::malformed("empty header name"));
    }
    if has_line_break(value) {
        return Err(ProtocolError::malformed(format!(
            "value of header {name:?} contains CR/LF"
        )));
    }
    // Only the single separator space belongs to the framing
    let value = value.strip_prefix(' ').unwrap_or(value);
    Ok((name.to_string(), value.to_string()))
}

pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_command_frame_wire_format() {
        let frame = Frame::command("admin", "TOKEN_xyz", Command::SpeedUp).unwrap();
        let encoded = frame.encode();

        assert_eq!(
            &encoded[..],
            b"VATP/1.0 COMMAND 0\r\nUsername: admin\r\nAuth-Token: TOKEN_xyz\r\nCommand: SPEED_UP\r\n\r\n"
        );
        assert_eq!(encoded.len(), frame.encoded_len());
    }

    #[test]
    fn test_connect_frame_wire_format() {
        let admin = Frame::connect(Role::Admin, "admin", Some("admin123")).unwrap();
        assert_eq!(
            &admin.encode()[..],
            b"VATP/1.0 CONNECT 0\r\nUser-Type: ADMIN\r\nUsername: admin\r\nPassword: admin123\r\n\r\n"
        );

        let observer = Frame::connect(Role::Observer, "observer", None).unwrap();
        assert_eq!(
            &observer.encode()[..],
            b"VATP/1.0 CONNECT 0\r\nUser-Type: OBSERVER\r\nUsername: observer\r\n\r\n"
        );
    }

    #[test]
    fn test_frame_without_headers() {
        let frame = Frame::builder(Method::Disconnect).build().unwrap();
        assert_eq!(&frame.encode()[..], b"VATP/1.0 DISCONNECT 0\r\n\r\n");

        let mut buf = frame.encode();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reject_crlf_in_value() {
        let result = Frame::auth("admin", "pw\r\nCommand: SPEED_UP");
        assert!(matches!(result, Err(ProtocolError::FrameMalformed(_))));

        let result = Frame::disconnect("bob\n");
        assert!(matches!(result, Err(ProtocolError::FrameMalformed(_))));
    }

    #[test]
    fn test_reject_bad_header_names() {
        let result = Frame::builder(Method::Auth).header("", "x").build();
        assert!(matches!(result, Err(ProtocolError::FrameMalformed(_))));

        let result = Frame::builder(Method::Auth).header("A:B", "x").build();
        assert!(matches!(result, Err(ProtocolError::FrameMalformed(_))));
    }

    #[test]
    fn test_incomplete_frame() {
        let mut buf = BytesMut::from(&b"VATP/1.0 AUTH 0\r\nUsername: admin\r\n"[..]);
        let before = buf.len();
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        // Nothing consumed while incomplete
        assert_eq!(buf.len(), before);
    }

    #[test]
    fn test_incomplete_body() {
        let mut buf = BytesMut::from(&b"VATP/1.0 AUTH 5\r\n\r\nab"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"cde");
        let frame = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.body_length(), 5);
        assert_eq!(frame.body().as_ref(), b"abcde");
    }

    #[test]
    fn test_unsupported_version() {
        let mut buf = BytesMut::from(&b"VATP/2.0 AUTH 0\r\n\r\n"[..]);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(v)) if v == "VATP/2.0"));
    }

    #[test]
    fn test_unknown_method() {
        let mut buf = BytesMut::from(&b"VATP/1.0 PING 0\r\n\r\n"[..]);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::UnknownMethod(_))));
    }

    #[test]
    fn test_malformed_request_line() {
        let mut buf = BytesMut::from(&b"HTTP/1.1 GET /\r\n\r\n"[..]);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::FrameMalformed(_))
        ));

        let mut buf = BytesMut::from(&b"VATP/1.0 AUTH many\r\n\r\n"[..]);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::FrameMalformed(_))
        ));

        let mut buf = BytesMut::from(&b"VATP/1.0 AUTH 0\r\nno separator\r\n\r\n"[..]);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::FrameMalformed(_))
        ));
    }

    #[test]
    fn test_header_block_too_large() {
        let mut buf = BytesMut::from(vec![b'a'; MAX_HEADER_SIZE + 1].as_slice());
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::HeaderTooLarge { .. })
        ));
    }

    #[test]
    fn test_body_length_too_large() {
        let mut buf = BytesMut::from(&b"VATP/1.0 AUTH 18446744073709551615\r\n\r\n"[..]);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::BodyTooLarge { .. })
        ));

        let line = format!("VATP/1.0 AUTH {}\r\n\r\n", MAX_BODY_SIZE + 1);
        let mut buf = BytesMut::from(line.as_bytes());
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::BodyTooLarge { .. })
        ));

        // Too many digits for usize at all
        let mut buf = BytesMut::from(&b"VATP/1.0 AUTH 99999999999999999999999\r\n\r\n"[..]);
        assert!(matches!(
            Frame::decode(&mut buf),
            Err(ProtocolError::FrameMalformed(_))
        ));
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let first = Frame::get_telemetry("admin").unwrap();
        let second = Frame::disconnect("admin").unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first.encode());
        buf.extend_from_slice(&second.encode());

        assert_eq!(Frame::decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(Frame::decode(&mut buf).unwrap().unwrap(), second);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_value_whitespace_preserved() {
        let frame = Frame::builder(Method::Auth)
            .header("Username", "  padded ")
            .header("Password", "")
            .build()
            .unwrap();
        let mut buf = frame.encode();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.header("Username"), Some("  padded "));
        assert_eq!(decoded.header("Password"), Some(""));
    }

    #[test]
    fn test_display_masks_credentials() {
        let frame = Frame::command("admin", "TOKEN_secret", Command::TurnLeft).unwrap();
        let shown = frame.to_string();
        assert!(shown.contains("COMMAND"));
        assert!(shown.contains("Command=TURN_LEFT"));
        assert!(!shown.contains("TOKEN_secret"));
    }

    #[test]
    fn test_method_requires_token() {
        assert!(Method::Command.requires_token());
        assert!(Method::ListUsers.requires_token());
        assert!(!Method::Auth.requires_token());
        assert!(!Method::GetTelemetry.requires_token());
    }

    fn arb_method() -> impl Strategy<Value = Method> {
        prop_oneof![
            Just(Method::Connect),
            Just(Method::Auth),
            Just(Method::Command),
            Just(Method::Disconnect),
            Just(Method::GetTelemetry),
            Just(Method::ListUsers),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            method in arb_method(),
            headers in proptest::collection::vec(
                ("[A-Za-z][A-Za-z0-9-]{0,15}", "[^\r\n]{0,32}"),
                0..6,
            ),
        ) {
            let mut builder = Frame::builder(method);
            for (name, value) in &headers {
                builder = builder.header(name.clone(), value.clone());
            }
            let frame = builder.build().unwrap();

            let mut buf = frame.encode();
            let decoded = Frame::decode(&mut buf).unwrap().unwrap();

            prop_assert_eq!(decoded.method(), method);
            prop_assert_eq!(decoded.body_length(), 0);
            prop_assert_eq!(decoded.headers(), frame.headers());
            prop_assert!(buf.is_empty());
        }
    }
}
