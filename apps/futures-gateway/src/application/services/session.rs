//! Client session delivery channel.
//!
//! Each session owns a bounded broadcast channel. The multiplexer holds
//! the only sender, so closing a session drops the sender and ends the
//! receiver. A session that falls behind loses its oldest undelivered
//! events; the sender never waits on it.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

use crate::domain::streaming::SessionEvent;
use crate::domain::subscription::SessionId;
use crate::infrastructure::metrics;

pub(crate) type SessionSender = broadcast::Sender<SessionEvent>;

/// Receiving end of a client session.
#[derive(Debug)]
pub struct ClientSession {
    id: SessionId,
    receiver: broadcast::Receiver<SessionEvent>,
    dropped: u64,
}

impl ClientSession {
    pub(crate) fn channel(id: SessionId, capacity: usize) -> (SessionSender, Self) {
        let (sender, receiver) = broadcast::channel(capacity.max(1));
        (
            sender,
            Self {
                id,
                receiver,
                dropped: 0,
            },
        )
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Events this session lost by lagging.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Wait for the next event. Returns `None` once the session is closed.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is ready.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        metrics::record_trades_dropped(skipped);
        warn!(session_id = self.id, skipped, "Session lagging, dropped trades");
    }
}
