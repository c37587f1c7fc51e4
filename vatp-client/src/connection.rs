//! Connection management.
//!
//! A [`Transport`] is the byte channel under a session. [`TcpChannel`] is the
//! production implementation; its `close` may be called from one task while
//! another is blocked in `recv`, and the pending read then completes as
//! end-of-stream.

use crate::error::ClientError;
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// Default read buffer size (2 KiB, one server message).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 2 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout for admin round trips. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    /// Creates a configuration with default timeouts and buffer size.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Sets the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the ADMIN round-trip timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the socket read size, clamped to the supported range.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// Ordered, bidirectional byte channel to one server.
pub trait Transport: Send + Sync + 'static {
    /// Writes all bytes.
    fn send(&self, bytes: &[u8]) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Waits for the next chunk. `Ok(None)` means end-of-stream, either
    /// because the peer closed or because [`Transport::close`] was called.
    fn recv(&self) -> impl Future<Output = Result<Option<Bytes>, ClientError>> + Send;

    /// Closes the channel. Idempotent, and safe while a `recv` is pending.
    fn close(&self) -> impl Future<Output = ()> + Send;

    /// Returns whether [`Transport::close`] has been called.
    fn is_closed(&self) -> bool;
}

/// A TCP connection to a VATP server.
pub struct TcpChannel {
    peer: Option<SocketAddr>,
    read_buffer_size: usize,
    /// Write half of the stream (for sending frames).
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Read half of the stream (for receiving chunks).
    reader: Mutex<Option<OwnedReadHalf>>,
    /// Flipped to `true` exactly once by `close`.
    closed: watch::Sender<bool>,
}

impl TcpChannel {
    /// Connects to the configured server.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", config.addr);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Timeout
            })?
            .map_err(|source| {
                tracing::debug!("Connection failed: {}", source);
                ClientError::ConnectionRefused {
                    addr: config.addr,
                    source,
                }
            })?;

        tracing::debug!("TCP connected to {}", config.addr);
        Ok(Self::from_stream(stream, config.read_buffer_size))
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream, read_buffer_size: usize) -> Self {
        stream.set_nodelay(true).ok();
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        let (closed, _) = watch::channel(false);

        Self {
            peer,
            read_buffer_size: read_buffer_size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE),
            writer: Mutex::new(Some(write_half)),
            reader: Mutex::new(Some(read_half)),
            closed,
        }
    }

    /// Returns the server address, if the socket reported one.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Transport for TcpChannel {
    async fn send(&self, bytes: &[u8]) -> Result<(), ClientError> {
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "channel closed")
        })?;
        writer.write_all(bytes).await?;
        tracing::trace!("wrote {} bytes", bytes.len());
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Bytes>, ClientError> {
        let closed = self.closed.subscribe();
        let already_closed = *closed.borrow();
        if already_closed {
            return Ok(None);
        }

        let mut reader_guard = self.reader.lock().await;
        let mut buf = BytesMut::with_capacity(self.read_buffer_size);

        let outcome = {
            let Some(reader) = reader_guard.as_mut() else {
                return Ok(None);
            };
            tokio::select! {
                biased;
                _ = wait_closed(closed) => None,
                read = reader.read_buf(&mut buf) => Some(read),
            }
        };

        match outcome {
            Some(Ok(n)) if n > 0 => {
                tracing::trace!("read {} bytes", n);
                Ok(Some(buf.freeze()))
            }
            Some(Ok(_)) => {
                tracing::debug!("connection closed by peer (0 bytes)");
                reader_guard.take();
                Ok(None)
            }
            Some(Err(e)) => {
                reader_guard.take();
                Err(ClientError::Io(e))
            }
            None => {
                tracing::debug!("pending read interrupted by close");
                reader_guard.take();
                Ok(None)
            }
        }
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        tracing::debug!("Closing channel to {:?}", self.peer);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        // A reader blocked in recv holds the lock; it drops the read half
        // itself once it sees the close signal.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Resolves once the close flag is set.
async fn wait_closed(mut closed: watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}
