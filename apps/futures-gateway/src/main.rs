//! Futures Gateway Binary
//!
//! Starts the live trade multiplexer, the historical bar cache, and the
//! client and health servers.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin futures-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `UPSTREAM_API_KEY`: Vendor API key (live and historical)
//!
//! ## Optional
//! - `UPSTREAM_LIVE_URL`: Vendor WebSocket URL
//! - `UPSTREAM_HISTORY_URL`: Vendor historical API base URL
//! - `GATEWAY_HTTP_PORT`: Client API port (default: 6940)
//! - `GATEWAY_HEALTH_PORT`: Health check and metrics port (default: 8082)
//! - `GATEWAY_MASTER_SYMBOLS`: Always-streamed symbols (default: every front contract)
//! - `GATEWAY_SESSION_BUFFER`: Per-session queue depth (default: 256)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_gateway::application::ports::FeedControlPort;
use futures_gateway::infrastructure::telemetry;
use futures_gateway::infrastructure::upstream::ConnectionState;
use futures_gateway::{
    AppState, BarCache, FeedEvent, FeedState, GatewayConfig, HealthServer, HealthServerState,
    HistoryService, HttpHistoricalSource, HttpServer, LiveMultiplexer, MasterStream,
    MultiplexerConfig, SymbolCatalog, UpstreamFeedConnection, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv_from_ancestors();

    // Initialize telemetry (tracing + optional OTLP export)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting futures gateway");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let catalog = Arc::new(SymbolCatalog::default());
    let master = config.master_list(&catalog);

    // Upstream live feed
    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(config.streaming.feed_event_buffer);
    let feed = Arc::new(UpstreamFeedConnection::new(
        config.feed_config(),
        master.clone(),
        feed_tx,
        shutdown_token.clone(),
    ));
    let feed_state = Arc::new(FeedState::new());

    // Live fan-out
    let multiplexer = Arc::new(
        LiveMultiplexer::new(
            Arc::clone(&catalog),
            Arc::clone(&feed) as Arc<dyn FeedControlPort>,
            MultiplexerConfig {
                session_buffer: config.streaming.session_buffer,
            },
        )
        .with_master_symbols(master),
    );
    let master_stream = Arc::new(MasterStream::new(config.streaming.master_stream_buffer));

    // Historical bars
    let source = HttpHistoricalSource::new(config.history_source_config())
        .context("failed to build historical source client")?;
    let history = Arc::new(HistoryService::new(
        Arc::clone(&catalog),
        Arc::new(source),
        Arc::new(BarCache::new(config.history.max_aggregates)),
    ));

    // Dispatch upstream events into the multiplexer
    let dispatch_multiplexer = Arc::clone(&multiplexer);
    let dispatch_state = Arc::clone(&feed_state);
    let dispatch_stream = Arc::clone(&master_stream);
    tokio::spawn(async move {
        handle_feed_events(feed_rx, dispatch_multiplexer, dispatch_stream, dispatch_state).await;
    });

    // Spawn upstream connection
    let feed_run = Arc::clone(&feed);
    let feed_run_state = Arc::clone(&feed_state);
    tokio::spawn(async move {
        if let Err(e) = feed_run.run().await {
            feed_run_state.set_error(e.to_string());
            tracing::error!(error = %e, "Upstream feed stopped");
        }
    });

    // Spawn client API server
    let http_server = HttpServer::new(
        config.server.http_port,
        AppState {
            multiplexer: Arc::clone(&multiplexer),
            history: Arc::clone(&history),
            feed_state: Arc::clone(&feed_state),
            master_stream,
        },
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "Client API server error");
        }
    });

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&feed_state),
        multiplexer,
        history,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Futures gateway ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Futures gateway stopped");
    Ok(())
}

/// Handle events from the upstream feed.
///
/// Sole writer of live trades into the multiplexer and the master stream.
/// Neither waits on a slow reader.
async fn handle_feed_events(
    mut rx: mpsc::Receiver<FeedEvent>,
    multiplexer: Arc<LiveMultiplexer>,
    master_stream: Arc<MasterStream>,
    feed_state: Arc<FeedState>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Connected => {
                feed_state.set_state(ConnectionState::Connected);
                tracing::info!("Upstream feed connected");
            }
            FeedEvent::Disconnected => {
                feed_state.set_state(ConnectionState::Disconnected);
                tracing::warn!("Upstream feed disconnected");
            }
            FeedEvent::Reconnecting { attempt } => {
                feed_state.set_reconnecting(attempt);
                tracing::info!(attempt, "Upstream feed reconnecting");
            }
            FeedEvent::Trade(trade) => {
                feed_state.increment_messages();
                master_stream.publish(&trade);
                multiplexer.publish(trade);
            }
            FeedEvent::Subscribed { symbols } => {
                feed_state.set_subscription_count(symbols.len());
                tracing::debug!(count = symbols.len(), "Upstream subscriptions updated");
            }
            FeedEvent::Error(msg) => {
                feed_state.record_error(msg.clone());
                tracing::error!(error = %msg, "Upstream feed error");
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        health_port = config.server.health_port,
        session_buffer = config.streaming.session_buffer,
        master_stream_buffer = config.streaming.master_stream_buffer,
        max_aggregates = config.history.max_aggregates,
        "Configuration loaded"
    );
    tracing::debug!(
        live_url = %config.websocket.url,
        history_url = %config.history.base_url,
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
