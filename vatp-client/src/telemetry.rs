//! OBSERVER telemetry stream.
//!
//! After CONNECT the server pushes telemetry unprompted. A background task
//! reads the channel until end-of-stream, an empty read or a transport
//! error, reassembles the received bytes into server messages and hands
//! each one to a [`TelemetryListener`]; the listener is told exactly once
//! that the stream closed. The task never sends and never retries.

use crate::connection::{ConnectionConfig, TcpChannel, Transport};
use crate::error::ClientError;
use crate::session::{Phase, Session};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vatp_protocol::{Decoder, Frame, Method, Role};

/// Receives telemetry from the background task.
pub trait TelemetryListener: Send + 'static {
    /// One received server message, decoded as (lossy) UTF-8. Text outside
    /// the message grammar is passed on as it arrives.
    fn on_data(&mut self, text: String);

    /// The stream ended. Called once, after the last `on_data`.
    fn on_closed(&mut self);
}

/// Event form of the listener callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "text", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Data(String),
    Closed,
}

impl TelemetryListener for mpsc::UnboundedSender<TelemetryEvent> {
    fn on_data(&mut self, text: String) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.send(TelemetryEvent::Data(text));
    }

    fn on_closed(&mut self) {
        let _ = self.send(TelemetryEvent::Closed);
    }
}

/// Listener built from a pair of closures. See [`callbacks`].
pub struct Callbacks<D, C> {
    on_data: D,
    on_closed: Option<C>,
}

/// Wraps `on_data` and `on_closed` closures into a [`TelemetryListener`].
pub fn callbacks<D, C>(on_data: D, on_closed: C) -> Callbacks<D, C>
where
    D: FnMut(String) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    Callbacks {
        on_data,
        on_closed: Some(on_closed),
    }
}

impl<D, C> TelemetryListener for Callbacks<D, C>
where
    D: FnMut(String) + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    fn on_data(&mut self, text: String) {
        (self.on_data)(text);
    }

    fn on_closed(&mut self) {
        if let Some(on_closed) = self.on_closed.take() {
            on_closed();
        }
    }
}

/// Handle to the background receive task.
pub struct TelemetryReceiver {
    handle: JoinHandle<()>,
}

impl TelemetryReceiver {
    /// Spawns the receive loop.
    ///
    /// When the loop ends the channel is closed, the session moves to
    /// DISCONNECTED, and then `listener.on_closed()` runs.
    pub fn start<T, L>(transport: Arc<T>, session: Arc<Mutex<Session>>, mut listener: L) -> Self
    where
        T: Transport,
        L: TelemetryListener,
    {
        let handle = tokio::spawn(async move {
            let messages = receive_loop(transport.as_ref(), &mut listener).await;

            transport.close().await;
            session.lock().on_disconnected();
            tracing::debug!("telemetry stream closed after {} messages", messages);
            listener.on_closed();
        });

        Self { handle }
    }

    /// Returns whether the receive loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the receive loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("telemetry task failed: {}", e);
        }
    }
}

async fn receive_loop<T, L>(transport: &T, listener: &mut L) -> u64
where
    T: Transport,
    L: TelemetryListener,
{
    let mut decoder = Decoder::new();
    let mut messages = 0u64;
    loop {
        match transport.recv().await {
            Ok(Some(chunk)) if !chunk.is_empty() => {
                tracing::trace!("<- telemetry chunk of {} bytes", chunk.len());
                decoder.extend_bytes(chunk);
                while let Some(message) = decoder.decode_response() {
                    messages += 1;
                    listener.on_data(message.raw().to_string());
                }
            }
            Ok(_) => {
                tracing::debug!("telemetry stream reached end-of-stream");
                break;
            }
            Err(e) => {
                tracing::warn!("telemetry stream failed: {}", e);
                break;
            }
        }
    }

    // A message cut short by the close is still delivered
    if let Some(rest) = decoder.take_response() {
        messages += 1;
        listener.on_data(rest.raw().to_string());
    }
    messages
}

/// OBSERVER client: CONNECT, then a background telemetry stream.
pub struct ObserverClient<T: Transport = TcpChannel> {
    transport: Arc<T>,
    session: Arc<Mutex<Session>>,
    receiver: Option<TelemetryReceiver>,
}

impl ObserverClient<TcpChannel> {
    /// Opens a TCP connection. No frame is sent until [`ObserverClient::connect`].
    pub async fn open(
        conn: &ConnectionConfig,
        username: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let channel = TcpChannel::connect(conn).await?;
        Ok(Self::new(channel, username))
    }
}

impl<T: Transport> ObserverClient<T> {
    /// Creates a client over an already open transport, in the INIT phase.
    pub fn new(transport: T, username: impl Into<String>) -> Self {
        Self {
            transport: Arc::new(transport),
            session: Arc::new(Mutex::new(Session::new(Role::Observer, username))),
            receiver: None,
        }
    }

    /// Snapshot of the session state.
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    /// Returns whether the session is in STREAMING.
    pub fn is_streaming(&self) -> bool {
        self.session.lock().phase() == Phase::Streaming
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends CONNECT with the OBSERVER role and starts streaming into
    /// `listener`.
    ///
    /// The server's reply to CONNECT is not awaited here; it arrives on the
    /// stream like any other chunk.
    pub async fn connect<L: TelemetryListener>(&mut self, listener: L) -> Result<(), ClientError> {
        let frame = {
            let session = self.session.lock();
            session.check(Method::Connect)?;
            Frame::connect(Role::Observer, session.username(), None)?
        };

        tracing::debug!("-> {}", frame);
        if let Err(e) = self.transport.send(&frame.encode()).await {
            tracing::warn!("CONNECT not delivered: {}", e);
            self.transport.close().await;
            self.session.lock().on_disconnected();
            return Err(e);
        }

        self.session.lock().on_connected()?;
        self.receiver = Some(TelemetryReceiver::start(
            self.transport.clone(),
            self.session.clone(),
            listener,
        ));
        Ok(())
    }

    /// Sends DISCONNECT (best effort), closes the channel and waits for the
    /// receive loop to finish. Idempotent.
    pub async fn disconnect(&mut self) {
        let frame = {
            let session = self.session.lock();
            if session.is_terminal() {
                None
            } else {
                Some(Frame::disconnect(session.username()))
            }
        };

        match frame {
            Some(Ok(frame)) => {
                tracing::debug!("-> {}", frame);
                if let Err(e) = self.transport.send(&frame.encode()).await {
                    tracing::warn!("DISCONNECT not delivered: {}", e);
                }
            }
            Some(Err(e)) => tracing::warn!("could not build DISCONNECT: {}", e),
            None => {}
        }

        self.transport.close().await;
        self.session.lock().on_disconnected();
        self.wait_closed().await;
    }

    /// Waits until the receive loop has exited (the server closed, the
    /// channel failed, or [`ObserverClient::disconnect`] was called).
    pub async fn wait_closed(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.join().await;
        }
    }
}
