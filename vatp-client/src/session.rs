//! Session state machine.
//!
//! ```text
//!            CONNECT(ADMIN)              AUTH + token
//!   INIT ──────────────────▶ CONNECTED_ADMIN ──────────▶ AUTHENTICATED ◀─┐
//!     │                           │  ▲                       │   COMMAND │
//!     │ CONNECT(OBSERVER)         └──┘ AUTH, no token        └───────────┘
//!     ▼
//!  STREAMING                 any non-terminal ── DISCONNECT / close ──▶ DISCONNECTED
//! ```
//!
//! The phase never moves back towards INIT, and DISCONNECTED is terminal.

use crate::error::ClientError;
use serde::Serialize;
use std::fmt;
use vatp_protocol::{Method, Role};

/// Connection phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Created, CONNECT not yet acknowledged.
    Init,
    /// ADMIN connected, no token held.
    ConnectedAdmin,
    /// ADMIN holding a session token.
    Authenticated,
    /// OBSERVER connected and receiving telemetry.
    Streaming,
    /// Closed; terminal for both roles.
    Disconnected,
}

impl Phase {
    /// Upper-case name used in logs and status output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::ConnectedAdmin => "CONNECTED_ADMIN",
            Phase::Authenticated => "AUTHENTICATED",
            Phase::Streaming => "STREAMING",
            Phase::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical client connection: role, phase and token.
#[derive(Debug, Clone)]
pub struct Session {
    role: Role,
    phase: Phase,
    token: Option<String>,
    username: String,
}

impl Session {
    /// Creates a session in the INIT phase.
    pub fn new(role: Role, username: impl Into<String>) -> Self {
        Self {
            role,
            phase: Phase::Init,
            token: None,
            username: username.into(),
        }
    }

    /// Returns the role announced on CONNECT.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the session token, if AUTH produced one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the username sent in every frame.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns whether a token is held.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Returns whether the session reached DISCONNECTED.
    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Disconnected
    }

    // Presentation queries: front ends derive button/prompt state from these
    // instead of tracking their own copy of the protocol state.

    /// Returns whether CONNECT may still be sent.
    pub fn can_connect(&self) -> bool {
        self.phase == Phase::Init
    }

    /// Returns whether drive commands may be sent.
    pub fn commands_enabled(&self) -> bool {
        self.phase == Phase::Authenticated && self.token.is_some()
    }

    /// Returns whether there is anything left to disconnect.
    pub fn can_disconnect(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns whether a frame of `method` may be emitted right now.
    pub fn allows(&self, method: Method) -> bool {
        self.check(method).is_ok()
    }

    /// Checks that a frame of `method` may be emitted in the current phase.
    ///
    /// Token-gated methods fail with `NotAuthenticated` whenever no token is
    /// held, regardless of phase.
    pub fn check(&self, method: Method) -> Result<(), ClientError> {
        if method.requires_token() && self.token.is_none() {
            return Err(ClientError::NotAuthenticated(method));
        }

        let allowed = match method {
            Method::Connect => self.phase == Phase::Init,
            Method::Auth => self.phase == Phase::ConnectedAdmin,
            Method::Command | Method::ListUsers => self.phase == Phase::Authenticated,
            Method::GetTelemetry => {
                matches!(self.phase, Phase::ConnectedAdmin | Phase::Authenticated)
            }
            Method::Disconnect => !self.is_terminal(),
        };

        if allowed {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                method,
                phase: self.phase,
            })
        }
    }

    /// CONNECT acknowledged: INIT → CONNECTED_ADMIN or STREAMING.
    pub fn on_connected(&mut self) -> Result<Phase, ClientError> {
        self.check(Method::Connect)?;
        let next = match self.role {
            Role::Admin => Phase::ConnectedAdmin,
            Role::Observer => Phase::Streaming,
        };
        self.transition(next);
        Ok(next)
    }

    /// AUTH answered. Stores the token and moves to AUTHENTICATED when one
    /// was found; otherwise the phase is unchanged.
    ///
    /// Returns whether the session is now authenticated.
    pub fn on_auth_response(&mut self, token: Option<String>) -> Result<bool, ClientError> {
        self.check(Method::Auth)?;
        match token {
            Some(token) => {
                self.token = Some(token);
                self.transition(Phase::Authenticated);
                Ok(true)
            }
            None => {
                tracing::debug!(user = %self.username, "AUTH response carried no token");
                Ok(false)
            }
        }
    }

    /// DISCONNECT issued or transport closed. Idempotent.
    pub fn on_disconnected(&mut self) {
        self.token = None;
        if self.phase != Phase::Disconnected {
            self.transition(Phase::Disconnected);
        }
    }

    fn transition(&mut self, next: Phase) {
        tracing::info!(
            role = %self.role,
            user = %self.username,
            "session {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
    }
}
