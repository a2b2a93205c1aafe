//! Upstream Feed Message Types
//!
//! Wire format types for the vendor's live trade WebSocket.
//!
//! # Control Messages
//! - `Success`: connection and authentication acknowledgments
//! - `Error`: error response with code and message
//! - `Subscription`: the vendor's view of the active subscription set
//!
//! # Market Data
//! - `Trade`: a single trade print on a continuous contract

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{Side, Symbol, Trade};

// =============================================================================
// Inbound Messages
// =============================================================================

/// Decoded upstream message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamMessage {
    /// Connection or authentication acknowledgment.
    Success(SuccessMessage),
    /// Error reported by the vendor.
    Error(ErrorMessage),
    /// Active subscription set after a change.
    Subscription(SubscriptionMessage),
    /// Trade print, already validated.
    Trade(Trade),
}

/// Success acknowledgment.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// `connected` or `authenticated`.
    pub msg: SuccessKind,
}

/// Kind of success message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessKind {
    /// Socket accepted, authentication pending.
    Connected,
    /// Credentials accepted.
    Authenticated,
}

/// Error message with code and description.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 402, "msg": "auth failed"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub msg: String,
}

impl ErrorMessage {
    /// Check if this is an authentication error.
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self.code, 401..=404)
    }

    /// Check if this is a subscription limit error.
    #[must_use]
    pub const fn is_limit_error(&self) -> bool {
        matches!(self.code, 405 | 406)
    }
}

/// Subscription confirmation.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "subscription", "symbols": ["ES.c.0", "NQ.c.0"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Symbols the vendor now streams.
    #[serde(default)]
    pub symbols: Vec<Symbol>,
}

/// Trade print.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "t", "S": "ES.c.0", "p": 5012.25, "s": 3, "side": "B",
///  "t": "2024-03-15T14:30:00.123456789Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Symbol.
    #[serde(rename = "S")]
    pub symbol: Symbol,

    /// Price, as a JSON number or decimal string.
    #[serde(rename = "p")]
    pub price: Decimal,

    /// Contracts traded.
    #[serde(rename = "s")]
    pub size: u64,

    /// Aggressor side code: `A`, `B`, or `N`.
    #[serde(default)]
    pub side: String,

    /// Exchange timestamp.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

/// A trade print that cannot be published.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTrade {
    /// No symbol.
    #[error("trade has no symbol")]
    MissingSymbol,

    /// No contracts changed hands.
    #[error("trade for {0} has size 0")]
    ZeroSize(Symbol),
}

impl TradeMessage {
    /// Convert to the domain trade.
    ///
    /// # Errors
    ///
    /// Rejects prints with no symbol or no contracts.
    pub fn into_trade(self) -> Result<Trade, InvalidTrade> {
        if self.symbol.is_empty() {
            return Err(InvalidTrade::MissingSymbol);
        }
        if self.size == 0 {
            return Err(InvalidTrade::ZeroSize(self.symbol));
        }
        Ok(Trade {
            side: Side::from_vendor_code(&self.side),
            symbol: self.symbol,
            timestamp: self.timestamp,
            size: self.size,
            price: self.price,
        })
    }
}

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Control request sent to the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlRequest {
    /// Authenticate with an API key.
    Auth {
        /// API key.
        key: String,
    },
    /// Add symbols to the stream.
    Subscribe {
        /// Symbols to add.
        symbols: Vec<Symbol>,
    },
    /// Remove symbols from the stream.
    Unsubscribe {
        /// Symbols to remove.
        symbols: Vec<Symbol>,
    },
}

impl ControlRequest {
    /// Serialize to the JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Tests
// =============================================================================
