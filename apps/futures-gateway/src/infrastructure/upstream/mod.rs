//! Upstream Vendor Adapters
//!
//! - [`live`]: the single WebSocket connection to the trade feed
//! - [`historical`]: the HTTP daily bar source
//!
//! Both authenticate with the same vendor API key.

pub mod auth;
pub mod backoff;
pub mod codec;
pub mod heartbeat;
pub mod historical;
pub mod live;
pub mod messages;
pub mod state;

pub use auth::{ApiKey, AuthError};
pub use backoff::{Backoff, BackoffConfig};
pub use heartbeat::HeartbeatConfig;
pub use historical::{HistoricalSourceConfig, HttpHistoricalSource};
pub use live::{FeedError, FeedEvent, SubscriptionState, UpstreamFeedConfig, UpstreamFeedConnection};
pub use state::{ConnectionState, FeedState, FeedStatus};
