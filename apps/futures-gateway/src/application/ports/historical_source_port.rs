//! Historical Source Port (Driven Port)
//!
//! Interface for fetching daily bars from the historical data vendor.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::history::{DailyBar, DateRange};

/// Historical source error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoricalSourceError {
    /// Vendor kept rejecting the request for exceeding its rate limit.
    #[error("Historical source rate limited")]
    RateLimited {
        /// Suggested wait before retrying, when the vendor sent one.
        retry_after: Option<Duration>,
    },

    /// Network or transport failure.
    #[error("Historical source transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Vendor answered with an unexpected status.
    #[error("Historical source returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("Historical source decode error: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

impl HistoricalSourceError {
    /// True when the failure is transient and the caller may retry later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

/// Source of daily bars.
#[async_trait]
pub trait HistoricalSourcePort: Send + Sync {
    /// Fetch daily bars for `symbol` over the inclusive `range`.
    ///
    /// Bars may be returned in any order and may omit non-trading days.
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<DailyBar>, HistoricalSourceError>;
}
