//! Historical Bar Types
//!
//! Daily OHLCV bars, date ranges, bar resolutions, and the rollup of
//! daily bars into weekly and monthly bars.
//!
//! # Aggregation
//!
//! - Weekly bars group daily bars by ISO week and are labeled with the
//!   Monday of that week.
//! - Monthly bars group by calendar month and are labeled with the 1st.
//! - `open` is the first daily open, `close` the last daily close,
//!   `high`/`low` the extremes, and `volume` the sum.
//! - A period with no daily bars produces no bar.

mod cache;

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::streaming::Symbol;

pub use cache::{AggregateKey, BarCache, BarCacheStats, MergeOutcome};

// =============================================================================
// Resolution
// =============================================================================

/// Bar resolution served to chart clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// One bar per trading day.
    Daily,
    /// One bar per ISO week.
    Weekly,
    /// One bar per calendar month.
    Monthly,
}

impl Resolution {
    /// Canonical short code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "D",
            Self::Weekly => "W",
            Self::Monthly => "M",
        }
    }

    /// First day of the period containing `date`.
    #[must_use]
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => date,
            Self::Weekly => {
                let back = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(back)).unwrap_or(date)
            }
            Self::Monthly => date.with_day(1).unwrap_or(date),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unsupported resolution code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported resolution: {0}")]
pub struct ParseResolutionError(pub String);

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "D" | "1D" => Ok(Self::Daily),
            "W" | "1W" => Ok(Self::Weekly),
            "M" | "1M" => Ok(Self::Monthly),
            _ => Err(ParseResolutionError(s.to_string())),
        }
    }
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateRange {
    /// First date.
    pub start: NaiveDate,
    /// Last date.
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range; `None` when `start > end`.
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Single-day range.
    #[must_use]
    pub const fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// True when `date` falls inside the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Portion of the range ending no later than `last`.
    #[must_use]
    pub fn clamp_end(&self, last: NaiveDate) -> Option<Self> {
        Self::new(self.start, self.end.min(last))
    }

    /// True when the two ranges overlap or touch.
    #[must_use]
    pub fn touches(&self, other: &Self) -> bool {
        let after_end = self.end.succ_opt().unwrap_or(self.end);
        let other_after_end = other.end.succ_opt().unwrap_or(other.end);
        self.start <= other_after_end && other.start <= after_end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

// =============================================================================
// Bars
// =============================================================================

/// One trading day of OHLCV data for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Continuous-contract symbol.
    pub symbol: Symbol,
    /// Trading date.
    pub date: NaiveDate,
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Contracts traded.
    pub volume: u64,
}

/// A bar at any resolution, labeled by the first day of its period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Period start.
    pub time: NaiveDate,
    /// Opening price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Contracts traded.
    pub volume: u64,
}

impl From<&DailyBar> for Bar {
    fn from(bar: &DailyBar) -> Self {
        Self {
            time: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        }
    }
}

/// Roll daily bars up to `resolution`.
///
/// Input must be sorted by date with no duplicates, which is how the
/// cache hands bars out.
#[must_use]
pub fn aggregate(daily: &[DailyBar], resolution: Resolution) -> Vec<Bar> {
    let mut bars: Vec<Bar> = Vec::new();

    for day in daily {
        let period = resolution.period_start(day.date);
        match bars.last_mut() {
            Some(current) if current.time == period => {
                current.high = current.high.max(day.high);
                current.low = current.low.min(day.low);
                current.close = day.close;
                current.volume = current.volume.saturating_add(day.volume);
            }
            _ => bars.push(Bar {
                time: period,
                ..Bar::from(day)
            }),
        }
    }

    bars
}

// =============================================================================
// Tests
// =============================================================================
