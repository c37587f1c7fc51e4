//! Scripted in-memory transport for unit tests.

use crate::connection::Transport;
use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use vatp_protocol::Frame;

/// One scripted result for `recv`.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Chunk(Bytes),
    Eof,
    Error(std::io::ErrorKind),
    /// Block until the transport is closed, then report end-of-stream.
    Hang,
}

impl Step {
    pub(crate) fn text(text: &str) -> Self {
        Step::Chunk(Bytes::copy_from_slice(text.as_bytes()))
    }
}

pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    sent: Mutex<Vec<Bytes>>,
    recv_calls: AtomicUsize,
    close_calls: AtomicUsize,
    fail_sends: Mutex<Option<std::io::ErrorKind>>,
    closed: watch::Sender<bool>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
            recv_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_sends: Mutex::new(None),
            closed,
        }
    }

    /// Replies for each given response text, then end-of-stream.
    pub(crate) fn replying(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|text| Step::text(text)))
    }

    pub(crate) fn fail_sends_with(&self, kind: std::io::ErrorKind) {
        *self.fail_sends.lock() = Some(kind);
    }

    pub(crate) fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    pub(crate) fn sent_frames(&self) -> Vec<Frame> {
        let mut buf = BytesMut::new();
        for chunk in self.sent.lock().iter() {
            buf.extend_from_slice(chunk);
        }
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = Frame::decode(&mut buf) {
            frames.push(frame);
        }
        frames
    }

    pub(crate) fn recv_calls(&self) -> usize {
        self.recv_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), ClientError> {
        if let Some(kind) = *self.fail_sends.lock() {
            return Err(std::io::Error::new(kind, "scripted send failure").into());
        }
        if self.is_closed() {
            return Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "closed").into());
        }
        self.sent.lock().push(Bytes::copy_from_slice(bytes));
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Bytes>, ClientError> {
        self.recv_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Ok(None);
        }

        let step = self.script.lock().pop_front().unwrap_or(Step::Eof);
        match step {
            Step::Chunk(bytes) => Ok(Some(bytes)),
            Step::Eof => Ok(None),
            Step::Error(kind) => Err(std::io::Error::new(kind, "scripted recv failure").into()),
            Step::Hang => {
                let mut closed = self.closed.subscribe();
                loop {
                    let is_closed = *closed.borrow_and_update();
                    if is_closed || closed.changed().await.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
