//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `LiveMultiplexer`: Routes upstream trades to client sessions
//! - `HistoryService`: Serves cached daily, weekly, and monthly bars
//! - `MasterStream`: Broadcasts every upstream trade to monitoring readers

mod history;
mod master_stream;
mod multiplexer;
mod session;

pub use history::{ExchangeClock, HistoryError, HistoryService, exchange_today};
pub use master_stream::MasterStream;
pub use multiplexer::{
    CONTROL_SESSION, LiveError, LiveMultiplexer, MultiplexerConfig, MultiplexerStats, PublishOutcome,
    SubscribeOutcome,
};
pub use session::ClientSession;
