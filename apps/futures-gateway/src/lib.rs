#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Futures Gateway - Market Data Multiplexer and Bar Cache
//!
//! Holds one WebSocket connection to the futures trade vendor and fans
//! trades out to any number of dashboard sessions. Serves daily, weekly,
//! and monthly bars for continuous contracts from an in-memory cache that
//! fetches missing days from the vendor's HTTP API.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Pure types and logic, no I/O
//!   - `catalog`: Served roots, categories, continuous-symbol parsing
//!   - `streaming`: Trades and the last-trade cache
//!   - `subscription`: Per-symbol reference counting across sessions
//!   - `history`: Daily bars, rollups, and the bar cache
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream feed control, historical source
//!   - `services`: Live multiplexer, master trade stream, history service
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `upstream`: Vendor WebSocket feed and HTTP historical source
//!   - `http`: Client WebSocket, feed control, SSE, and UDF endpoints
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                      subscribe/unsubscribe (0->1, 1->0 only)
//!          +---------------------------------------------------+
//!          v                                                   |
//! +------------------+  FeedEvent  +------------------+  +-------------+
//! | Upstream feed WS |-----------> | LiveMultiplexer  |->| Session 1   |
//! +------------------+   (mpsc)    | last-trade cache |->| Session 2   |
//!                                  | registry         |->| Session N   |
//!                                  +------------------+  +-------------+
//!
//! +------------------+  miss   +----------------+  hit  +-------------+
//! | Vendor HTTP API  |<------- | HistoryService |<----- | /udf/history|
//! +------------------+         | BarCache       |       +-------------+
//!                              +----------------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::catalog::{AssetCategory, SymbolCatalog};
pub use domain::history::{Bar, BarCache, DailyBar, DateRange, Resolution};
pub use domain::streaming::{SessionEvent, Side, Symbol, Trade};
pub use domain::subscription::{SessionId, SubscriptionRegistry};

// Application services
pub use application::ports::{FeedControlPort, HistoricalSourceError, HistoricalSourcePort};
pub use application::services::{
    ClientSession, HistoryError, HistoryService, LiveError, LiveMultiplexer, MasterStream,
    MultiplexerConfig, PublishOutcome,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, GatewayConfig, HistorySettings, ServerSettings, StreamingSettings,
    WebSocketSettings,
};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::http::{AppState, HttpServer, HttpServerError};

// Upstream adapters
pub use infrastructure::upstream::{
    ApiKey, FeedError, FeedEvent, FeedState, HistoricalSourceConfig, HttpHistoricalSource,
    UpstreamFeedConfig, UpstreamFeedConnection,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
