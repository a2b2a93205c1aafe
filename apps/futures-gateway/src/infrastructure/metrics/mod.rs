//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Feed**: Upstream messages, errors, reconnects, connection state
//! - **Sessions**: Active client sessions, trades delivered and dropped
//! - **History**: Vendor fetches, deduplicated fetches, rollup cache hits
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "futures_gateway_feed_messages_total",
        "Upstream feed messages received by kind"
    );
    describe_counter!(
        "futures_gateway_feed_errors_total",
        "Upstream feed errors by kind"
    );
    describe_counter!(
        "futures_gateway_feed_reconnects_total",
        "Upstream reconnection attempts"
    );
    describe_gauge!(
        "futures_gateway_feed_connected",
        "1 when the upstream feed is authenticated, 0 otherwise"
    );
    describe_gauge!(
        "futures_gateway_upstream_symbols",
        "Symbols subscribed on the upstream feed"
    );

    // Sessions
    describe_gauge!(
        "futures_gateway_sessions",
        "Active client sessions"
    );
    describe_counter!(
        "futures_gateway_trades_delivered_total",
        "Trades handed to client sessions"
    );
    describe_counter!(
        "futures_gateway_trades_dropped_total",
        "Trades a lagging session never received"
    );
    describe_counter!(
        "futures_gateway_trades_stale_total",
        "Out-of-order trades discarded"
    );
    describe_counter!(
        "futures_gateway_client_errors_total",
        "Client requests rejected by kind"
    );

    // History
    describe_counter!(
        "futures_gateway_history_fetches_total",
        "Vendor fetches by outcome"
    );
    describe_counter!(
        "futures_gateway_history_fetches_deduplicated_total",
        "Requests that joined a fetch already in flight"
    );
    describe_counter!(
        "futures_gateway_history_rollups_total",
        "Weekly and monthly rollup lookups by cache result"
    );
    describe_histogram!(
        "futures_gateway_history_fetch_seconds",
        "Vendor fetch latency"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a message received from the upstream feed.
pub fn record_feed_message(kind: &'static str) {
    counter!("futures_gateway_feed_messages_total", "kind" => kind).increment(1);
}

/// Record an upstream feed error.
pub fn record_feed_error(kind: &'static str) {
    counter!("futures_gateway_feed_errors_total", "kind" => kind).increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("futures_gateway_feed_reconnects_total").increment(1);
}

/// Update the upstream connection gauge.
pub fn set_feed_connected(connected: bool) {
    gauge!("futures_gateway_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the upstream subscription count.
pub fn set_upstream_symbols(count: usize) {
    gauge!("futures_gateway_upstream_symbols").set(count as f64);
}

/// Update the active session count.
pub fn set_sessions(count: usize) {
    gauge!("futures_gateway_sessions").set(count as f64);
}

/// Record trades handed to sessions.
pub fn record_trades_delivered(count: u64) {
    counter!("futures_gateway_trades_delivered_total").increment(count);
}

/// Record trades lost by a lagging session.
pub fn record_trades_dropped(count: u64) {
    counter!("futures_gateway_trades_dropped_total").increment(count);
}

/// Record an out-of-order trade.
pub fn record_trade_stale() {
    counter!("futures_gateway_trades_stale_total").increment(1);
}

/// Record a rejected client request.
pub fn record_client_error(kind: &'static str) {
    counter!("futures_gateway_client_errors_total", "kind" => kind).increment(1);
}

/// Record a vendor fetch and its latency.
pub fn record_history_fetch(outcome: &'static str, duration: Duration) {
    counter!("futures_gateway_history_fetches_total", "outcome" => outcome).increment(1);
    histogram!("futures_gateway_history_fetch_seconds").record(duration.as_secs_f64());
}

/// Record a request that joined an in-flight fetch.
pub fn record_history_dedup() {
    counter!("futures_gateway_history_fetches_deduplicated_total").increment(1);
}

/// Record a rollup lookup.
pub fn record_rollup_lookup(hit: bool) {
    counter!(
        "futures_gateway_history_rollups_total",
        "result" => if hit { "hit" } else { "miss" }
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
