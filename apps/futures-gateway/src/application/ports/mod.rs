//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedControlPort`: Subscribe and unsubscribe on the upstream live feed
//! - `HistoricalSourcePort`: Fetch daily bars from the historical vendor

mod feed_control_port;
mod historical_source_port;

#[cfg(test)]
pub use feed_control_port::MockFeedControlPort;
pub use feed_control_port::FeedControlPort;
pub use historical_source_port::{HistoricalSourceError, HistoricalSourcePort};
