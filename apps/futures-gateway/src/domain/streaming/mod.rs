//! Market Data Streaming Types
//!
//! Core domain types for live futures trades. These types are
//! codec-agnostic and represent the canonical internal representation
//! of a trade print regardless of how the upstream vendor encodes it.

mod last_trade;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use last_trade::{LastTradeCache, RecordOutcome};

/// A continuous-contract symbol, e.g. `ES.c.0`.
pub type Symbol = String;

// =============================================================================
// Side
// =============================================================================

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buyer lifted the offer.
    Buy,
    /// Seller hit the bid.
    Sell,
    /// No aggressor reported.
    #[default]
    Neutral,
}

impl Side {
    /// Map the vendor's single-letter side code.
    ///
    /// `A` (trade at the ask side of the book) is a sell aggressor and
    /// `B` is a buy aggressor. Anything else is neutral.
    #[must_use]
    pub fn from_vendor_code(code: &str) -> Self {
        match code {
            "A" => Self::Sell,
            "B" => Self::Buy,
            _ => Self::Neutral,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Neutral => "neutral",
        }
    }
}

// =============================================================================
// Trade
// =============================================================================

/// A single trade print, or the placeholder for a symbol that has not
/// traded since startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Continuous-contract symbol.
    pub symbol: Symbol,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
    /// Aggressor side.
    pub side: Side,
    /// Contracts traded. Zero only for the placeholder.
    pub size: u64,
    /// Trade price.
    pub price: Decimal,
}

impl Trade {
    /// Placeholder entry for a symbol with no trade yet.
    #[must_use]
    pub fn placeholder(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            side: Side::Neutral,
            size: 0,
            price: Decimal::ZERO,
        }
    }

    /// True when this is the no-trade-yet placeholder.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        self.size == 0
    }
}

// =============================================================================
// Session Events
// =============================================================================

/// An event delivered to a client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Last-trade value pushed when the session starts following a symbol.
    Seed(Trade),
    /// Live trade for a followed symbol.
    Trade(Trade),
}

impl SessionEvent {
    /// The trade carried by the event.
    #[must_use]
    pub const fn trade(&self) -> &Trade {
        match self {
            Self::Seed(trade) | Self::Trade(trade) => trade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("A", Side::Sell)]
    #[test_case("B", Side::Buy)]
    #[test_case("N", Side::Neutral)]
    #[test_case("", Side::Neutral)]
    #[test_case("b", Side::Neutral ; "codes are case sensitive")]
    fn vendor_side_codes(code: &str, expected: Side) {
        assert_eq!(Side::from_vendor_code(code), expected);
    }

    #[test]
    fn side_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"buy\"");
        assert_eq!(Side::Neutral.as_str(), "neutral");
    }

    #[test]
    fn placeholder_has_zero_size_and_price() {
        let trade = Trade::placeholder("ES.c.0");
        assert!(trade.is_placeholder());
        assert_eq!(trade.price, Decimal::ZERO);
        assert_eq!(trade.side, Side::Neutral);
    }
}
