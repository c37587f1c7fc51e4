//! ADMIN command dispatcher.
//!
//! Requests are strictly sequential: every method takes `&mut self`, sends one
//! frame and performs exactly one receive, so the response to frame N is read
//! before frame N+1 is written.

use crate::connection::{ConnectionConfig, TcpChannel, Transport};
use crate::error::ClientError;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use vatp_protocol::{Command, Frame, Method, Response, Role, TokenPolicy};

/// What to do when an AUTH response carries no token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Stay CONNECTED_ADMIN and hand the response back to the caller.
    #[default]
    Silent,
    /// Stay CONNECTED_ADMIN and fail with [`ClientError::AuthFailed`].
    Strict,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Silent => f.write_str("silent"),
            AuthMode::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silent" => Ok(AuthMode::Silent),
            "strict" => Ok(AuthMode::Strict),
            other => Err(format!("unknown auth mode: {other}")),
        }
    }
}

/// ADMIN username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("admin", "admin123")
    }
}

/// ADMIN session settings.
#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    pub credentials: Credentials,
    pub auth_mode: AuthMode,
    pub token_policy: TokenPolicy,
}

impl AdminConfig {
    /// Creates settings with the default auth mode and token policy.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    /// Sets how a tokenless AUTH response is reported.
    pub fn with_auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    /// Sets how the token is found in the AUTH response.
    pub fn with_token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = policy;
        self
    }
}

/// ADMIN client: CONNECT, AUTH, then token-bearing commands.
pub struct AdminClient<T: Transport = TcpChannel> {
    transport: T,
    session: Session,
    config: AdminConfig,
    request_timeout: Option<Duration>,
}

impl AdminClient<TcpChannel> {
    /// Opens a TCP connection. No frame is sent until [`AdminClient::connect`].
    pub async fn open(conn: &ConnectionConfig, config: AdminConfig) -> Result<Self, ClientError> {
        let channel = TcpChannel::connect(conn).await?;
        let mut client = Self::new(channel, config);
        client.request_timeout = conn.request_timeout;
        Ok(client)
    }
}

impl<T: Transport> AdminClient<T> {
    /// Creates a client over an already open transport, in the INIT phase.
    pub fn new(transport: T, config: AdminConfig) -> Self {
        let session = Session::new(Role::Admin, config.credentials.username.clone());
        Self {
            transport,
            session,
            config,
            request_timeout: None,
        }
    }

    /// Bounds each request/response round trip.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Returns the session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the ADMIN settings.
    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// CONNECT followed by AUTH. Returns the AUTH response.
    pub async fn login(&mut self) -> Result<Response, ClientError> {
        self.connect().await?;
        self.authenticate().await
    }

    /// Sends CONNECT with the ADMIN role and moves to CONNECTED_ADMIN.
    pub async fn connect(&mut self) -> Result<Response, ClientError> {
        self.session.check(Method::Connect)?;

        let credentials = &self.config.credentials;
        let frame = Frame::connect(
            Role::Admin,
            &credentials.username,
            Some(&credentials.password),
        )?;
        let response = self.exchange(&frame).await?;
        if response.is_error() {
            tracing::warn!("CONNECT answered with an error: {}", response);
        }

        self.session.on_connected()?;
        Ok(response)
    }

    /// Sends AUTH and stores the token found in the response.
    ///
    /// A response without a token leaves the session CONNECTED_ADMIN; what
    /// the caller sees then depends on [`AuthMode`].
    pub async fn authenticate(&mut self) -> Result<Response, ClientError> {
        self.session.check(Method::Auth)?;

        let credentials = &self.config.credentials;
        let frame = Frame::auth(&credentials.username, &credentials.password)?;
        let response = self.exchange(&frame).await?;

        let token = self.config.token_policy.extract(&response);
        if self.session.on_auth_response(token)? {
            return Ok(response);
        }

        tracing::warn!(
            policy = %self.config.token_policy,
            "no session token in AUTH response"
        );
        match self.config.auth_mode {
            AuthMode::Silent => Ok(response),
            AuthMode::Strict => Err(ClientError::AuthFailed),
        }
    }

    /// Sends one drive command. Fails with `NotAuthenticated` before any I/O
    /// when no token is held.
    pub async fn send_command(&mut self, command: Command) -> Result<Response, ClientError> {
        let token = self.token_for(Method::Command)?;
        let frame = Frame::command(self.session.username(), token, command)?;
        self.exchange(&frame).await
    }

    /// Asks the server for the connected users. Token-gated like COMMAND.
    pub async fn list_users(&mut self) -> Result<Response, ClientError> {
        let token = self.token_for(Method::ListUsers)?;
        let frame = Frame::list_users(self.session.username(), token)?;
        self.exchange(&frame).await
    }

    /// Requests a one-shot telemetry snapshot.
    pub async fn get_telemetry(&mut self) -> Result<Response, ClientError> {
        self.session.check(Method::GetTelemetry)?;
        let frame = Frame::get_telemetry(self.session.username())?;
        self.exchange(&frame).await
    }

    /// Sends DISCONNECT (best effort) and closes the channel. Idempotent.
    pub async fn disconnect(&mut self) {
        if self.session.is_terminal() {
            return;
        }

        match Frame::disconnect(self.session.username()) {
            Ok(frame) => {
                tracing::debug!("-> {}", frame);
                if let Err(e) = self.transport.send(&frame.encode()).await {
                    tracing::warn!("DISCONNECT not delivered: {}", e);
                }
            }
            Err(e) => tracing::warn!("could not build DISCONNECT: {}", e),
        }

        self.transport.close().await;
        self.session.on_disconnected();
    }

    fn token_for(&self, method: Method) -> Result<&str, ClientError> {
        self.session.check(method)?;
        self.session
            .token()
            .ok_or(ClientError::NotAuthenticated(method))
    }

    /// One request/response round trip.
    async fn exchange(&mut self, frame: &Frame) -> Result<Response, ClientError> {
        tracing::debug!("-> {}", frame);
        if let Err(e) = self.transport.send(&frame.encode()).await {
            return Err(self.fail(e).await);
        }

        let received = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.transport.recv())
                .await
                .unwrap_or(Err(ClientError::Timeout)),
            None => self.transport.recv().await,
        };

        match received {
            Ok(Some(chunk)) => {
                tracing::debug!("<- {} bytes", chunk.len());
                Ok(Response::from_bytes(&chunk))
            }
            Ok(None) => Err(self.fail(ClientError::PeerClosed).await),
            Err(e) => Err(self.fail(e).await),
        }
    }

    /// Tears the session down after a fatal error.
    async fn fail(&mut self, err: ClientError) -> ClientError {
        tracing::warn!(phase = %self.session.phase(), "session lost: {}", err);
        self.transport.close().await;
        self.session.on_disconnected();
        err
    }
}
