//! Upstream Authentication
//!
//! The live feed requires authentication right after the socket opens:
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Receive `{"T":"success","msg":"connected"}`
//! 3. Send `{"action":"auth","key":"..."}`
//! 4. Receive `{"T":"success","msg":"authenticated"}` or an error
//!
//! The same API key authorizes the historical HTTP API as a bearer token.

use thiserror::Error;

use super::messages::{ControlRequest, ErrorMessage, SuccessKind, SuccessMessage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// API key missing or blank.
    #[error("API key cannot be empty")]
    EmptyKey,

    /// Vendor rejected the key.
    #[error("authentication failed: invalid API key")]
    InvalidCredentials,

    /// Vendor closed the authentication window.
    #[error("authentication timeout")]
    Timeout,

    /// Vendor refused the connection for exceeding its connection limit.
    #[error("connection limit exceeded")]
    ConnectionLimitExceeded,

    /// Any other error code during the handshake.
    #[error("server error ({code}): {message}")]
    ServerError {
        /// Error code from server.
        code: i32,
        /// Error message from server.
        message: String,
    },
}

impl From<&ErrorMessage> for AuthError {
    fn from(err: &ErrorMessage) -> Self {
        match err.code {
            401 | 402 => Self::InvalidCredentials,
            404 => Self::Timeout,
            406 => Self::ConnectionLimitExceeded,
            code => Self::ServerError {
                code,
                message: err.msg.clone(),
            },
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Vendor API key.
///
/// `Debug` and `Display` never print the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is blank.
    pub fn new(key: impl Into<String>) -> Result<Self, AuthError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(AuthError::EmptyKey);
        }
        Ok(Self(key))
    }

    /// Raw key for the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// Authentication progress on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Waiting for the server's `connected` greeting.
    #[default]
    AwaitingGreeting,
    /// Auth request sent.
    Authenticating,
    /// Credentials accepted.
    Authenticated,
    /// Handshake failed.
    Failed,
}

/// What the connection should do after a handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Send this request.
    Send(ControlRequest),
    /// Authentication just completed.
    Authenticated,
    /// Nothing to do.
    Idle,
}

/// Authentication state machine for one connection.
#[derive(Debug)]
pub struct Handshake {
    key: ApiKey,
    state: AuthState,
    just_authenticated: bool,
}

impl Handshake {
    /// Start a handshake.
    #[must_use]
    pub const fn new(key: ApiKey) -> Self {
        Self {
            key,
            state: AuthState::AwaitingGreeting,
            just_authenticated: false,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// True once authenticated.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.state, AuthState::Authenticated)
    }

    /// Advance on a success message.
    pub fn on_success(&mut self, msg: &SuccessMessage) -> HandshakeStep {
        match (msg.msg, self.state) {
            (SuccessKind::Connected, AuthState::AwaitingGreeting) => {
                self.state = AuthState::Authenticating;
                HandshakeStep::Send(ControlRequest::Auth {
                    key: self.key.expose().to_string(),
                })
            }
            (SuccessKind::Authenticated, AuthState::Authenticating) => {
                self.state = AuthState::Authenticated;
                self.just_authenticated = true;
                HandshakeStep::Authenticated
            }
            _ => HandshakeStep::Idle,
        }
    }

    /// True exactly once after authentication completes.
    pub const fn take_just_authenticated(&mut self) -> bool {
        let value = self.just_authenticated;
        self.just_authenticated = false;
        value
    }

    /// Fail on an error message received before authentication.
    pub fn on_error(&mut self, msg: &ErrorMessage) -> AuthError {
        self.state = AuthState::Failed;
        AuthError::from(msg)
    }
}
