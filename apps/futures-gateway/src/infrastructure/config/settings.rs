//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.
//! Only `UPSTREAM_API_KEY` is required; unparsable optional values fall back
//! to their defaults.

use std::time::Duration;

use crate::domain::catalog::{SymbolCatalog, front_contract};
use crate::domain::streaming::Symbol;
use crate::infrastructure::upstream::{
    ApiKey, BackoffConfig, HeartbeatConfig, HistoricalSourceConfig, UpstreamFeedConfig,
};

const DEFAULT_LIVE_URL: &str = "wss://live.example-vendor.com/v1/stream";
const DEFAULT_HISTORY_URL: &str = "https://hist.example-vendor.com";

/// Upstream WebSocket settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketSettings {
    /// Live feed URL.
    pub url: String,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering connection dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_LIVE_URL.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

impl WebSocketSettings {
    /// Reconnect schedule.
    #[must_use]
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.reconnect_delay_initial,
            max_delay: self.reconnect_delay_max,
            multiplier: self.reconnect_delay_multiplier,
            max_attempts: self.max_reconnect_attempts,
            ..BackoffConfig::default()
        }
    }

    /// Heartbeat behavior.
    #[must_use]
    pub const fn heartbeat(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            ping_interval: self.heartbeat_interval,
            timeout: self.heartbeat_timeout,
        }
    }
}

/// Live fan-out buffer sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingSettings {
    /// Per-session queue depth before the oldest events are dropped.
    pub session_buffer: usize,
    /// Queue depth between the feed reader and the dispatcher.
    pub feed_event_buffer: usize,
    /// Trades buffered per `/live/master_stream` reader before it skips.
    pub master_stream_buffer: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            session_buffer: 256,
            feed_event_buffer: 4096,
            master_stream_buffer: 1024,
        }
    }
}

/// Historical bar source and cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySettings {
    /// Vendor HTTP API base URL.
    pub base_url: String,
    /// Weekly and monthly rollups kept in memory.
    pub max_aggregates: usize,
    /// Rate-limit retries per fetch.
    pub max_retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HISTORY_URL.to_string(),
            max_aggregates: 1024,
            max_retries: 3,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Client API port (live WebSocket, snapshot REST, UDF).
    pub http_port: u16,
    /// Health check and metrics port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 6940,
            health_port: 8082,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Vendor API key for both live and historical APIs.
    pub api_key: ApiKey,
    /// Server port settings.
    pub server: ServerSettings,
    /// Upstream WebSocket settings.
    pub websocket: WebSocketSettings,
    /// Fan-out buffer sizes.
    pub streaming: StreamingSettings,
    /// Historical source and cache settings.
    pub history: HistorySettings,
    /// Explicit master list; `None` streams every catalog front contract.
    pub master_symbols: Option<Vec<Symbol>>,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `UPSTREAM_API_KEY` is missing or blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let api_key = env
            .get("UPSTREAM_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("UPSTREAM_API_KEY".to_string()))?;
        let api_key =
            ApiKey::new(api_key).map_err(|_| ConfigError::EmptyValue("UPSTREAM_API_KEY".to_string()))?;

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            http_port: env.parse("GATEWAY_HTTP_PORT", server_defaults.http_port),
            health_port: env.parse("GATEWAY_HEALTH_PORT", server_defaults.health_port),
        };

        let ws_defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            url: env.string("UPSTREAM_LIVE_URL", &ws_defaults.url),
            heartbeat_interval: env.duration_secs(
                "GATEWAY_HEARTBEAT_INTERVAL_SECS",
                ws_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "GATEWAY_HEARTBEAT_TIMEOUT_SECS",
                ws_defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: env.duration_millis(
                "GATEWAY_RECONNECT_DELAY_INITIAL_MS",
                ws_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "GATEWAY_RECONNECT_DELAY_MAX_SECS",
                ws_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "GATEWAY_RECONNECT_DELAY_MULTIPLIER",
                ws_defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "GATEWAY_MAX_RECONNECT_ATTEMPTS",
                ws_defaults.max_reconnect_attempts,
            ),
        };

        let streaming_defaults = StreamingSettings::default();
        let streaming = StreamingSettings {
            session_buffer: env
                .parse("GATEWAY_SESSION_BUFFER", streaming_defaults.session_buffer)
                .max(1),
            feed_event_buffer: env
                .parse("GATEWAY_FEED_EVENT_BUFFER", streaming_defaults.feed_event_buffer)
                .max(1),
            master_stream_buffer: env
                .parse(
                    "GATEWAY_MASTER_STREAM_BUFFER",
                    streaming_defaults.master_stream_buffer,
                )
                .max(1),
        };

        let history_defaults = HistorySettings::default();
        let history = HistorySettings {
            base_url: env.string("UPSTREAM_HISTORY_URL", &history_defaults.base_url),
            max_aggregates: env.parse(
                "GATEWAY_HISTORY_MAX_AGGREGATES",
                history_defaults.max_aggregates,
            ),
            max_retries: env.parse("GATEWAY_HISTORY_MAX_RETRIES", history_defaults.max_retries),
            timeout: env.duration_secs("GATEWAY_HISTORY_TIMEOUT_SECS", history_defaults.timeout),
        };

        let master_symbols = env.get("GATEWAY_MASTER_SYMBOLS").map(|list| parse_symbol_list(&list));

        Ok(Self {
            api_key,
            server,
            websocket,
            streaming,
            history,
            master_symbols,
        })
    }

    /// Upstream live connection settings.
    #[must_use]
    pub fn feed_config(&self) -> UpstreamFeedConfig {
        UpstreamFeedConfig {
            url: self.websocket.url.clone(),
            api_key: self.api_key.clone(),
            backoff: self.websocket.backoff(),
            heartbeat: self.websocket.heartbeat(),
        }
    }

    /// Historical HTTP source settings.
    #[must_use]
    pub fn history_source_config(&self) -> HistoricalSourceConfig {
        HistoricalSourceConfig {
            timeout: self.history.timeout,
            max_retries: self.history.max_retries,
            ..HistoricalSourceConfig::new(self.history.base_url.clone(), self.api_key.clone())
        }
    }

    /// Master list resolved against the catalog. Unknown entries are
    /// skipped with a warning.
    #[must_use]
    pub fn master_list(&self, catalog: &SymbolCatalog) -> Vec<Symbol> {
        let Some(symbols) = &self.master_symbols else {
            return catalog.front_contracts();
        };
        let mut resolved: Vec<Symbol> = symbols
            .iter()
            .filter(|s| {
                let known = catalog.is_known(s);
                if !known {
                    tracing::warn!(symbol = %s, "Ignoring unknown master symbol");
                }
                known
            })
            .cloned()
            .collect();
        resolved.sort();
        resolved.dedup();
        resolved
    }
}

/// Split a comma list; bare roots become front contracts.
fn parse_symbol_list(list: &str) -> Vec<Symbol> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.contains('.') {
                s.to_string()
            } else {
                front_contract(&s.to_uppercase())
            }
        })
        .collect()
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
