//! Upstream Live Feed Connection
//!
//! Owns the single WebSocket to the vendor's trade stream.
//!
//! # Lifecycle
//!
//! connect → authenticate → send the full desired symbol set → stream.
//! On any failure the connection backs off, reconnects and restores exactly
//! the desired set: the master list plus every symbol a client session is
//! currently interested in.
//!
//! # Control
//!
//! [`FeedControlPort`] calls never touch the socket. They update the desired
//! set and enqueue a command that the connection task sends once
//! authenticated. Commands queued while disconnected are discarded on
//! reconnect because the full set is sent instead.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::auth::{ApiKey, AuthError, Handshake, HandshakeStep};
use super::backoff::{Backoff, BackoffConfig};
use super::codec::{CodecError, FeedCodec};
use super::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatMonitor};
use super::messages::{ControlRequest, UpstreamMessage};
use crate::application::ports::FeedControlPort;
use crate::domain::streaming::{Symbol, Trade};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one upstream connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(#[from] AuthError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Outbound request could not be encoded.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// No traffic within the heartbeat timeout.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// Connection closed by the vendor.
    #[error("connection closed")]
    ConnectionClosed,

    /// `run` was called twice.
    #[error("feed connection already running")]
    AlreadyRunning,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Feed Events
// =============================================================================

/// Events emitted by the upstream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Authenticated; the desired set has been sent.
    Connected,
    /// Connection lost.
    Disconnected,
    /// Waiting to reconnect.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Trade print.
    Trade(Trade),
    /// Vendor's confirmed subscription set.
    Subscribed {
        /// Symbols now streaming.
        symbols: Vec<Symbol>,
    },
    /// Error reported by the vendor after authentication.
    Error(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the upstream connection.
#[derive(Debug, Clone)]
pub struct UpstreamFeedConfig {
    /// WebSocket URL.
    pub url: String,
    /// Vendor API key.
    pub api_key: ApiKey,
    /// Reconnect schedule.
    pub backoff: BackoffConfig,
    /// Heartbeat behavior.
    pub heartbeat: HeartbeatConfig,
}

impl UpstreamFeedConfig {
    /// Configuration with default backoff and heartbeat.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            url: url.into(),
            api_key,
            backoff: BackoffConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

// =============================================================================
// Subscription State
// =============================================================================

/// Desired upstream subscription set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionState {
    master: BTreeSet<Symbol>,
    client: BTreeSet<Symbol>,
}

impl SubscriptionState {
    /// State holding only the master list.
    #[must_use]
    pub fn with_master(master: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            master: master.into_iter().collect(),
            client: BTreeSet::new(),
        }
    }

    /// Master list ∪ client interest, sorted.
    #[must_use]
    pub fn desired(&self) -> Vec<Symbol> {
        self.master.union(&self.client).cloned().collect()
    }

    /// Symbols clients are interested in, sorted.
    #[must_use]
    pub fn client_symbols(&self) -> Vec<Symbol> {
        self.client.iter().cloned().collect()
    }

    /// True if `symbol` is on the master list.
    #[must_use]
    pub fn is_master(&self, symbol: &str) -> bool {
        self.master.contains(symbol)
    }

    /// Add client interest. Returns the symbols that newly need an
    /// upstream subscribe.
    pub fn add_client(&mut self, symbols: &[Symbol]) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|s| self.client.insert((*s).clone()) && !self.master.contains(*s))
            .cloned()
            .collect()
    }

    /// Remove client interest. Returns the symbols that should be
    /// unsubscribed upstream; master symbols are never returned.
    pub fn remove_client(&mut self, symbols: &[Symbol]) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|s| self.client.remove(*s) && !self.master.contains(*s))
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
enum FeedCommand {
    Subscribe(Vec<Symbol>),
    Unsubscribe(Vec<Symbol>),
}

impl From<FeedCommand> for ControlRequest {
    fn from(command: FeedCommand) -> Self {
        match command {
            FeedCommand::Subscribe(symbols) => Self::Subscribe { symbols },
            FeedCommand::Unsubscribe(symbols) => Self::Unsubscribe { symbols },
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// The single upstream live connection.
pub struct UpstreamFeedConnection {
    config: UpstreamFeedConfig,
    codec: FeedCodec,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    subscriptions: parking_lot::RwLock<SubscriptionState>,
    command_tx: mpsc::UnboundedSender<FeedCommand>,
    command_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<FeedCommand>>>,
}

impl UpstreamFeedConnection {
    /// Create a connection that always streams `master` symbols.
    #[must_use]
    pub fn new(
        config: UpstreamFeedConfig,
        master: impl IntoIterator<Item = Symbol>,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            config,
            codec: FeedCodec::new(),
            event_tx,
            cancel,
            subscriptions: parking_lot::RwLock::new(SubscriptionState::with_master(master)),
            command_tx,
            command_rx: parking_lot::Mutex::new(Some(command_rx)),
        }
    }

    /// Current desired subscription set.
    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionState {
        self.subscriptions.read().clone()
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if called twice or when the reconnect attempt limit
    /// is reached.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedError> {
        let mut commands = self
            .command_rx
            .lock()
            .take()
            .ok_or(FeedError::AlreadyRunning)?;
        let mut backoff = Backoff::new(self.config.backoff.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Upstream feed cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut commands, &mut backoff).await {
                Ok(()) => {
                    tracing::info!("Upstream feed closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream feed connection error");
                    metrics::set_feed_connected(false);
                    self.emit(FeedEvent::Disconnected);

                    let Some(delay) = backoff.next_delay() else {
                        return Err(FeedError::MaxReconnectAttemptsExceeded);
                    };
                    let attempt = backoff.attempts();
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Reconnecting to upstream feed"
                    );
                    metrics::record_reconnect();
                    self.emit(FeedEvent::Reconnecting { attempt });

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Upstream feed cancelled during reconnect delay");
                            return Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn connect_and_run(
        &self,
        commands: &mut mpsc::UnboundedReceiver<FeedCommand>,
        backoff: &mut Backoff,
    ) -> Result<(), FeedError> {
        tracing::info!(url = %self.config.url, "Connecting to upstream feed");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        let mut handshake = Handshake::new(self.config.api_key.clone());
        let mut heartbeat = HeartbeatMonitor::new(self.config.heartbeat);
        let period = heartbeat.interval();
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match heartbeat.on_tick() {
                        HeartbeatAction::SendPing => {
                            write.send(Message::Ping(vec![].into())).await?;
                        }
                        HeartbeatAction::TimedOut => {
                            tracing::warn!("Upstream heartbeat timeout");
                            metrics::record_feed_error("heartbeat_timeout");
                            return Err(FeedError::HeartbeatTimeout);
                        }
                    }
                }
                Some(command) = commands.recv(), if handshake.is_authenticated() => {
                    let request = ControlRequest::from(command);
                    tracing::debug!(?request, "Sending subscription change");
                    write.send(Message::Text(request.to_json()?.into())).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat.saw_traffic();
                            for request in self.handle_text(&text, &mut handshake)? {
                                write.send(Message::Text(request.to_json()?.into())).await?;
                            }
                            if handshake.is_authenticated() && backoff.attempts() > 0 {
                                backoff.reset();
                            }
                            if let Some(request) = self.take_restore_request(&mut handshake, commands) {
                                write.send(Message::Text(request.to_json()?.into())).await?;
                                self.emit(FeedEvent::Connected);
                            }
                        }
                        Some(Ok(Message::Pong(_))) => heartbeat.saw_traffic(),
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat.saw_traffic();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Upstream sent close frame");
                            return Err(FeedError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("Upstream stream ended");
                            return Err(FeedError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Decode one frame, returning handshake requests to send.
    fn handle_text(
        &self,
        text: &str,
        handshake: &mut Handshake,
    ) -> Result<Vec<ControlRequest>, FeedError> {
        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed upstream frame");
                metrics::record_feed_error(e.kind());
                return Ok(Vec::new());
            }
        };

        for rejected in &frame.rejected {
            tracing::warn!(error = %rejected, "Dropping upstream message");
            metrics::record_feed_error(rejected.kind());
        }

        let mut outbound = Vec::new();
        for message in frame.messages {
            match message {
                UpstreamMessage::Success(success) => {
                    if let HandshakeStep::Send(request) = handshake.on_success(&success) {
                        outbound.push(request);
                    }
                }
                UpstreamMessage::Error(error) => {
                    metrics::record_feed_error("vendor_error");
                    if !handshake.is_authenticated() {
                        tracing::error!(code = error.code, msg = %error.msg, "Upstream authentication error");
                        return Err(handshake.on_error(&error).into());
                    }
                    tracing::warn!(code = error.code, msg = %error.msg, "Upstream error");
                    self.emit(FeedEvent::Error(error.msg));
                }
                UpstreamMessage::Subscription(sub) => {
                    tracing::debug!(count = sub.symbols.len(), "Upstream subscription confirmed");
                    self.emit(FeedEvent::Subscribed {
                        symbols: sub.symbols,
                    });
                }
                UpstreamMessage::Trade(trade) => {
                    metrics::record_feed_message("trade");
                    self.emit(FeedEvent::Trade(trade));
                }
            }
        }
        Ok(outbound)
    }

    /// After authentication completes, discard queued commands and build the
    /// request that restores the full desired set. Returns `None` except on
    /// the first call after authentication.
    fn take_restore_request(
        &self,
        handshake: &mut Handshake,
        commands: &mut mpsc::UnboundedReceiver<FeedCommand>,
    ) -> Option<ControlRequest> {
        if !handshake.take_just_authenticated() {
            return None;
        }
        while commands.try_recv().is_ok() {}
        let symbols = self.subscriptions.read().desired();
        tracing::info!(count = symbols.len(), "Upstream authenticated, restoring subscriptions");
        metrics::set_feed_connected(true);
        metrics::set_upstream_symbols(symbols.len());
        Some(ControlRequest::Subscribe { symbols })
    }

    fn emit(&self, event: FeedEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::warn!(error = %e, "Feed event channel full, dropping event");
            metrics::record_feed_error("event_overflow");
        }
    }
}

impl FeedControlPort for UpstreamFeedConnection {
    fn subscribe(&self, symbols: &[Symbol]) {
        let added = self.subscriptions.write().add_client(symbols);
        if !added.is_empty() {
            tracing::debug!(symbols = ?added, "Queueing upstream subscribe");
            let _ = self.command_tx.send(FeedCommand::Subscribe(added));
        }
    }

    fn unsubscribe(&self, symbols: &[Symbol]) {
        let removed = self.subscriptions.write().remove_client(symbols);
        if !removed.is_empty() {
            tracing::debug!(symbols = ?removed, "Queueing upstream unsubscribe");
            let _ = self.command_tx.send(FeedCommand::Unsubscribe(removed));
        }
    }
}
