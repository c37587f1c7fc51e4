//! Encoder and decoder for VATP frames and server text.

use crate::error::ProtocolError;
use crate::frame::{find, Frame, HEADER_TERMINATOR};
use crate::message::{parse_status_line, Response};
use crate::{MAX_BODY_SIZE, MAX_HEADER_SIZE};
use bytes::{Bytes, BytesMut};

/// Every server message starts with the protocol tag.
const MESSAGE_START: &[u8] = b"VATP/";

/// Encodes frames into wire bytes.
pub struct Encoder;

impl Encoder {
    /// Encodes a frame.
    pub fn encode_frame(frame: &Frame) -> BytesMut {
        frame.encode()
    }

    /// Encodes several frames back to back into one buffer.
    pub fn encode_frames<'a>(frames: impl IntoIterator<Item = &'a Frame>) -> BytesMut {
        let mut buf = BytesMut::new();
        for frame in frames {
            buf.extend_from_slice(&frame.encode());
        }
        buf
    }
}

/// Buffers incoming bytes and splits them into frames or server messages.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(2048),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends bytes to the internal buffer.
    pub fn extend_bytes(&mut self, data: Bytes) {
        self.buffer.extend_from_slice(&data);
    }

    /// Attempts to decode the next request frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Splits the next complete server message off the buffer.
    ///
    /// A message is a status line and optional header lines up to the blank
    /// line, followed by as many body bytes as the status line announces
    /// (`VATP/1.0 TELEMETRY_DATA <length>`). A status line without a numeric
    /// length announces no body. Text that does not start with a status line
    /// is passed through up to the next one.
    ///
    /// Returns `None` while the next message is incomplete.
    pub fn decode_response(&mut self) -> Option<Response> {
        if self.buffer.is_empty() {
            return None;
        }

        if !self.buffer.starts_with(MESSAGE_START) {
            if MESSAGE_START.starts_with(&self.buffer[..]) {
                // Could still turn into a status line
                return None;
            }
            let end = find(&self.buffer[1..], MESSAGE_START)
                .map(|pos| pos + 1)
                .unwrap_or(self.buffer.len());
            return Some(Response::from_bytes(&self.buffer.split_to(end)));
        }

        let Some(head_len) = find(&self.buffer, HEADER_TERMINATOR) else {
            if self.buffer.len() > MAX_HEADER_SIZE {
                return self.take_response();
            }
            return None;
        };

        let body_length = announced_body_length(&self.buffer[..head_len]);
        if body_length > MAX_BODY_SIZE {
            return self.take_response();
        }

        let total_len = head_len + HEADER_TERMINATOR.len() + body_length;
        if self.buffer.len() < total_len {
            return None;
        }
        Some(Response::from_bytes(&self.buffer.split_to(total_len)))
    }

    /// Drains everything buffered as one server response, complete or not.
    pub fn take_response(&mut self) -> Option<Response> {
        if self.buffer.is_empty() {
            return None;
        }
        let data = self.buffer.split();
        Some(Response::from_bytes(&data))
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn announced_body_length(head: &[u8]) -> usize {
    let head = String::from_utf8_lossy(head);
    head.lines()
        .next()
        .and_then(parse_status_line)
        .and_then(|line| line.rest.parse().ok())
        .unwrap_or(0)
}
