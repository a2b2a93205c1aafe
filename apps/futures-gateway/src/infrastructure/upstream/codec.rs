//! Upstream Feed Codec
//!
//! Decodes text frames from the vendor's live feed. Frames are a JSON
//! array of messages or a single message object; each message carries its
//! kind in the `"T"` field.
//!
//! A bad element does not poison the rest of the frame: elements that fail
//! to decode are returned separately so the caller can log and count them.

use super::messages::{
    ErrorMessage, InvalidTrade, SubscriptionMessage, SuccessMessage, TradeMessage,
    UpstreamMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Element has no `"T"` field.
    #[error("message has no type field")]
    MissingType,

    /// Trade payload is not a usable trade.
    #[error("invalid trade: {0}")]
    InvalidTrade(String),

    /// Invalid frame format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl From<InvalidTrade> for CodecError {
    fn from(err: InvalidTrade) -> Self {
        Self::InvalidTrade(err.to_string())
    }
}

impl CodecError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::UnknownMessageType(_) => "unknown_type",
            Self::MissingType => "missing_type",
            Self::InvalidTrade(_) => "invalid_trade",
            Self::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// Result of decoding one frame.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// Messages decoded successfully, in frame order.
    pub messages: Vec<UpstreamMessage>,
    /// Elements that failed to decode.
    pub rejected: Vec<CodecError>,
}

/// JSON codec for the live feed.
#[derive(Debug, Default, Clone)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON array or object.
    /// Per-element failures are reported in [`DecodedFrame::rejected`].
    pub fn decode(&self, text: &str) -> Result<DecodedFrame, CodecError> {
        let trimmed = text.trim();
        let elements: Vec<serde_json::Value> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else if trimmed.starts_with('{') {
            vec![serde_json::from_str(trimmed)?]
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {preview}..."
            )));
        };

        let mut frame = DecodedFrame::default();
        for value in elements {
            match Self::decode_value(value) {
                Ok(message) => frame.messages.push(message),
                Err(err) => frame.rejected.push(err),
            }
        }
        Ok(frame)
    }

    fn decode_value(value: serde_json::Value) -> Result<UpstreamMessage, CodecError> {
        let kind = value
            .get("T")
            .and_then(|v| v.as_str())
            .ok_or(CodecError::MissingType)?
            .to_string();

        let message = match kind.as_str() {
            "success" => UpstreamMessage::Success(serde_json::from_value::<SuccessMessage>(value)?),
            "error" => UpstreamMessage::Error(serde_json::from_value::<ErrorMessage>(value)?),
            "subscription" => {
                UpstreamMessage::Subscription(serde_json::from_value::<SubscriptionMessage>(value)?)
            }
            "t" => {
                let trade: TradeMessage = serde_json::from_value(value)
                    .map_err(|e| CodecError::InvalidTrade(e.to_string()))?;
                UpstreamMessage::Trade(trade.into_trade()?)
            }
            other => return Err(CodecError::UnknownMessageType(other.to_string())),
        };
        Ok(message)
    }
}

// =============================================================================
// Tests
// =============================================================================
