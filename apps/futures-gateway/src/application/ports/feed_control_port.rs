//! Feed Control Port (Driven Port)
//!
//! Interface the multiplexer uses to change the upstream subscription set.

use crate::domain::streaming::Symbol;

/// Subscription control over the single upstream live connection.
///
/// Calls must not block on network I/O. Implementations record the
/// desired set and forward the request to the connection task, which
/// replays the full desired set after every reconnect.
#[cfg_attr(test, mockall::automock)]
pub trait FeedControlPort: Send + Sync {
    /// Start receiving trades for `symbols`.
    fn subscribe(&self, symbols: &[Symbol]);

    /// Stop receiving trades for `symbols`.
    fn unsubscribe(&self, symbols: &[Symbol]);
}
