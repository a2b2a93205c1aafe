//! Feed Connection State
//!
//! Shared, lock-light view of the upstream connection for the health and
//! status endpoints. Written by the feed event dispatcher, read by HTTP
//! handlers.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Upstream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Socket opening or authenticating.
    Connecting,
    /// Authenticated and streaming.
    Connected,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Gave up or hit a fatal error.
    Error,
}

/// Point-in-time copy of [`FeedState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Connection state.
    pub state: ConnectionState,
    /// Last successful authentication.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last error reported by the connection.
    pub error_message: Option<String>,
    /// Symbols the vendor last confirmed.
    pub subscription_count: usize,
    /// Reconnect attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Trades received since startup.
    pub messages_received: u64,
}

/// Tracks the state of the upstream feed connection.
#[derive(Debug, Default)]
pub struct FeedState {
    state: parking_lot::RwLock<ConnectionState>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    error_message: parking_lot::RwLock<Option<String>>,
    subscription_count: AtomicU64,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
}

impl FeedState {
    /// Create a disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            self.reconnect_attempts.store(0, Ordering::Relaxed);
            *self.error_message.write() = None;
        }
    }

    /// Record an error without changing the connection state.
    pub fn record_error(&self, message: String) {
        *self.error_message.write() = Some(message);
    }

    /// Enter the error state.
    pub fn set_error(&self, message: String) {
        *self.state.write() = ConnectionState::Error;
        *self.error_message.write() = Some(message);
    }

    /// Record a reconnect attempt.
    pub fn set_reconnecting(&self, attempt: u32) {
        *self.state.write() = ConnectionState::Reconnecting;
        self.reconnect_attempts.store(attempt, Ordering::Relaxed);
    }

    /// Increment messages received counter.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the confirmed subscription count.
    pub fn set_subscription_count(&self, count: usize) {
        self.subscription_count
            .store(u64::try_from(count).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// True while authenticated and streaming.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Snapshot for status endpoints.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            error_message: self.error_message.read().clone(),
            subscription_count: usize::try_from(self.subscription_count.load(Ordering::Relaxed))
                .unwrap_or(usize::MAX),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let state = FeedState::new();
        assert_eq!(state.state(), ConnectionState::Disconnected);
        assert!(!state.is_connected());
        assert!(state.status().last_connected_at.is_none());
    }

    #[test]
    fn connecting_clears_error_and_attempts() {
        let state = FeedState::new();
        state.set_reconnecting(3);
        state.record_error("socket reset".to_string());
        assert_eq!(state.status().reconnect_attempts, 3);

        state.set_state(ConnectionState::Connected);
        let status = state.status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.reconnect_attempts, 0);
        assert!(status.error_message.is_none());
        assert!(status.last_connected_at.is_some());
    }

    #[test]
    fn status_serializes_snake_case() {
        let state = FeedState::new();
        state.set_state(ConnectionState::Reconnecting);
        let json = serde_json::to_value(state.status()).unwrap();
        assert_eq!(json["state"], "reconnecting");
    }
}
