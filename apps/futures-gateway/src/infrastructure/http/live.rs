//! Live Trade Endpoints
//!
//! # WebSocket (`GET /live/ws`)
//!
//! Each connection is one client session. Clients send:
//!
//! ```json
//! {"action": "subscribe", "symbols": ["ES.c.0", "NQ.c.0"]}
//! {"action": "unsubscribe", "symbols": ["NQ.c.0"]}
//! {"action": "replace", "symbols": ["CL.c.0"]}
//! {"action": "ping"}
//! {"params": {"symbol": ["ES.c.0"]}}
//! ```
//!
//! The last form is what the dashboard widget sends and replaces the
//! whole interest set. Server frames are tagged by `type`: `seed`,
//! `trade`, `subscribed`, `unsubscribed`, `error`, and `pong`.
//!
//! # REST
//!
//! - `GET /live/get_ws_data?symbol=A,B`: last trade per symbol
//! - `GET /live/control/status`: feed connection and fan-out summary
//! - `GET /live/control/subscribe?symbols=A,B`: hold symbols upstream
//!   without a client session
//! - `GET /live/control/unsubscribe?symbols=A,B`: release them again
//! - `GET /live/symbology?asset_type=energy`: symbol picker entries
//!
//! # Server-Sent Events (`GET /live/master_stream`)
//!
//! Every upstream trade as a `trade` event, whatever clients follow. A
//! reader that falls behind skips trades rather than holding up the feed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use chrono_tz::America::Chicago;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::{ApiError, AppState};
use crate::application::services::{LiveError, LiveMultiplexer};
use crate::domain::catalog::{AssetCategory, SymbolCatalog, SymbologyEntry};
use crate::domain::streaming::{SessionEvent, Side, Symbol, Trade};
use crate::domain::subscription::SessionId;
use crate::infrastructure::metrics;

const TRADE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Routes mounted under `/live`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/get_ws_data", get(last_trades_handler))
        .route("/control/status", get(status_handler))
        .route("/control/subscribe", get(control_subscribe_handler))
        .route("/control/unsubscribe", get(control_unsubscribe_handler))
        .route("/master_stream", get(master_stream_handler))
        .route("/symbology", get(symbology_handler))
}

// =============================================================================
// Client Frames
// =============================================================================

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Explicit action.
    Action(ClientAction),
    /// Dashboard widget form; replaces the interest set.
    Dashboard {
        /// Widget parameters.
        params: DashboardParams,
    },
}

/// Explicit client actions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientAction {
    /// Follow additional symbols.
    Subscribe {
        /// Symbols to add.
        #[serde(deserialize_with = "one_or_many")]
        symbols: Vec<String>,
    },
    /// Stop following symbols.
    Unsubscribe {
        /// Symbols to remove.
        #[serde(deserialize_with = "one_or_many")]
        symbols: Vec<String>,
    },
    /// Follow exactly these symbols.
    Replace {
        /// Complete interest set.
        #[serde(deserialize_with = "one_or_many")]
        symbols: Vec<String>,
    },
    /// Keepalive.
    Ping,
}

/// Dashboard widget parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DashboardParams {
    /// Symbols to show.
    #[serde(deserialize_with = "one_or_many")]
    pub symbol: Vec<String>,
}

/// Accept a list, a single symbol, or a comma-separated string.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => split_symbols(&value),
        OneOrMany::Many(values) => values,
    })
}

fn split_symbols(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Server Frames
// =============================================================================

/// Trade as shown to dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradePayload {
    /// Exchange-local timestamp, `2024-03-01T09:30:00-0600`.
    pub date: String,
    /// Continuous-contract symbol.
    pub symbol: Symbol,
    /// Display name.
    pub name: String,
    /// Aggressor side.
    pub side: Side,
    /// Contracts traded.
    pub size: u64,
    /// Trade price.
    pub price: f64,
}

impl TradePayload {
    /// Render a trade. Placeholders carry the current time.
    #[must_use]
    pub fn new(trade: &Trade, catalog: &SymbolCatalog) -> Self {
        let timestamp = if trade.is_placeholder() {
            Utc::now()
        } else {
            trade.timestamp
        };
        Self {
            date: timestamp
                .with_timezone(&Chicago)
                .format(TRADE_DATE_FORMAT)
                .to_string(),
            symbol: trade.symbol.clone(),
            name: catalog.display_name(&trade.symbol),
            side: trade.side,
            size: trade.size,
            price: trade.price.to_f64().unwrap_or_default(),
        }
    }
}

/// A frame sent to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Last known trade for a newly followed symbol.
    Seed(TradePayload),
    /// Live trade.
    Trade(TradePayload),
    /// Symbols accepted by a subscribe or replace.
    Subscribed {
        /// Accepted symbols.
        symbols: Vec<Symbol>,
    },
    /// Symbols released by an unsubscribe.
    Unsubscribed {
        /// Symbols the session was following and no longer does.
        symbols: Vec<Symbol>,
    },
    /// Request rejected in whole or in part.
    Error {
        /// Machine-readable code.
        code: &'static str,
        /// Details.
        message: String,
    },
    /// Reply to `ping`.
    Pong {
        /// Server time, unix milliseconds.
        timestamp: i64,
    },
}

impl ServerMessage {
    /// Render a session event.
    #[must_use]
    pub fn from_event(event: &SessionEvent, catalog: &SymbolCatalog) -> Self {
        match event {
            SessionEvent::Seed(trade) => Self::Seed(TradePayload::new(trade, catalog)),
            SessionEvent::Trade(trade) => Self::Trade(TradePayload::new(trade, catalog)),
        }
    }

    fn error(code: &'static str, message: impl Into<String>) -> Self {
        metrics::record_client_error(code);
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

impl From<LiveError> for ServerMessage {
    fn from(err: LiveError) -> Self {
        let code = match err {
            LiveError::UnknownSession(_) => "unknown_session",
            LiveError::UnknownSymbols(_) => "unknown_symbols",
        };
        Self::error(code, err.to_string())
    }
}

// =============================================================================
// Client Frame Handling
// =============================================================================

/// Apply one client text frame and return the direct replies.
///
/// Seeds are not part of the reply; they arrive on the session channel.
pub fn handle_client_text(
    multiplexer: &LiveMultiplexer,
    session: SessionId,
    text: &str,
) -> Vec<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(session_id = session, error = %e, "Invalid client frame");
            return vec![ServerMessage::error("invalid_message", e.to_string())];
        }
    };

    let action = match message {
        ClientMessage::Action(action) => action,
        ClientMessage::Dashboard { params } => ClientAction::Replace {
            symbols: params.symbol,
        },
    };

    match action {
        ClientAction::Subscribe { symbols } => {
            subscribed_replies(multiplexer.subscribe(session, &symbols))
        }
        ClientAction::Replace { symbols } => {
            subscribed_replies(multiplexer.replace_interest(session, &symbols))
        }
        ClientAction::Unsubscribe { symbols } => match multiplexer.unsubscribe(session, &symbols) {
            Ok(released) => vec![ServerMessage::Unsubscribed { symbols: released }],
            Err(e) => vec![e.into()],
        },
        ClientAction::Ping => vec![ServerMessage::Pong {
            timestamp: Utc::now().timestamp_millis(),
        }],
    }
}

fn subscribed_replies(
    result: Result<crate::application::services::SubscribeOutcome, LiveError>,
) -> Vec<ServerMessage> {
    match result {
        Ok(outcome) => {
            let rejection = outcome.rejection();
            let mut replies = vec![ServerMessage::Subscribed {
                symbols: outcome.accepted,
            }];
            replies.extend(rejection.map(ServerMessage::from));
            replies
        }
        Err(e) => vec![e.into()],
    }
}

// =============================================================================
// WebSocket Session
// =============================================================================

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let multiplexer = Arc::clone(&state.multiplexer);
    ws.on_upgrade(move |socket| handle_socket(socket, multiplexer))
}

async fn handle_socket(socket: WebSocket, multiplexer: Arc<LiveMultiplexer>) {
    let mut session = multiplexer.open_session();
    let session_id = session.id();
    let (mut sender, mut receiver) = socket.split();
    info!(session_id, "Client connected");

    'session: loop {
        tokio::select! {
            event = session.recv() => {
                let Some(event) = event else { break };
                let message = ServerMessage::from_event(&event, multiplexer.catalog());
                if send_json(&mut sender, &message).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    for reply in handle_client_text(&multiplexer, session_id, text.as_str()) {
                        if send_json(&mut sender, &reply).await.is_err() {
                            break 'session;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(session_id, error = %e, "Client socket error");
                    break;
                }
            },
        }
    }

    multiplexer.close_session(session_id);
    info!(session_id, dropped = session.dropped(), "Client disconnected");
}

async fn send_json<S>(sender: &mut S, message: &ServerMessage) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to encode server frame");
            Ok(())
        }
    }
}

// =============================================================================
// REST Handlers
// =============================================================================

#[derive(Debug, Deserialize)]
struct SymbolsQuery {
    #[serde(default)]
    symbol: String,
}

async fn last_trades_handler(
    State(state): State<AppState>,
    Query(query): Query<SymbolsQuery>,
) -> Json<Vec<TradePayload>> {
    let multiplexer = &state.multiplexer;
    let catalog = multiplexer.catalog();
    let payloads = split_symbols(&query.symbol)
        .into_iter()
        .map(|symbol| {
            // Unknown symbols get a placeholder but never a cache entry.
            let trade = if catalog.is_known(&symbol) {
                multiplexer
                    .last_trades(std::slice::from_ref(&symbol))
                    .pop()
                    .unwrap_or_else(|| Trade::placeholder(symbol))
            } else {
                Trade::placeholder(symbol)
            };
            TradePayload::new(&trade, catalog)
        })
        .collect();
    Json(payloads)
}

/// Feed and fan-out summary.
#[derive(Debug, Clone, Serialize)]
pub struct LiveStatusResponse {
    /// Upstream feed authenticated.
    pub connected: bool,
    /// Open client sessions.
    pub active_clients: usize,
    /// Symbols streamed upstream.
    pub subscribed_symbols: Vec<Symbol>,
}

async fn status_handler(State(state): State<AppState>) -> Json<LiveStatusResponse> {
    Json(LiveStatusResponse {
        connected: state.feed_state.is_connected(),
        active_clients: state.multiplexer.session_count(),
        subscribed_symbols: state.multiplexer.streamed_symbols(),
    })
}

#[derive(Debug, Deserialize)]
struct ControlQuery {
    #[serde(default)]
    symbols: String,
}

impl ControlQuery {
    fn symbols(&self) -> Result<Vec<String>, ApiError> {
        let symbols = split_symbols(&self.symbols);
        if symbols.is_empty() {
            return Err(ApiError::bad_request("missing_symbols", "No symbols provided"));
        }
        Ok(symbols)
    }
}

/// Reply to `/control/subscribe`.
#[derive(Debug, Clone, Serialize)]
pub struct ControlSubscribeResponse {
    /// Always true; failures are reported as errors.
    pub success: bool,
    /// Symbols now held.
    pub subscribed: Vec<Symbol>,
    /// Symbols outside the catalog.
    pub rejected: Vec<String>,
}

/// Reply to `/control/unsubscribe`.
#[derive(Debug, Clone, Serialize)]
pub struct ControlUnsubscribeResponse {
    /// Always true; failures are reported as errors.
    pub success: bool,
    /// Symbols that were held and are now released.
    pub unsubscribed: Vec<Symbol>,
}

async fn control_subscribe_handler(
    State(state): State<AppState>,
    Query(query): Query<ControlQuery>,
) -> Result<Json<ControlSubscribeResponse>, ApiError> {
    let outcome = state.multiplexer.control_subscribe(&query.symbols()?);
    if !outcome.rejected.is_empty() {
        metrics::record_client_error("unknown_symbols");
    }
    Ok(Json(ControlSubscribeResponse {
        success: true,
        subscribed: outcome.accepted,
        rejected: outcome.rejected,
    }))
}

async fn control_unsubscribe_handler(
    State(state): State<AppState>,
    Query(query): Query<ControlQuery>,
) -> Result<Json<ControlUnsubscribeResponse>, ApiError> {
    let unsubscribed = state.multiplexer.control_unsubscribe(&query.symbols()?);
    Ok(Json(ControlUnsubscribeResponse {
        success: true,
        unsubscribed,
    }))
}

async fn master_stream_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.master_stream.subscribe();
    let multiplexer = Arc::clone(&state.multiplexer);
    info!(readers = state.master_stream.receiver_count(), "Master stream reader connected");

    let events = futures_util::stream::unfold(receiver, move |mut receiver| {
        let multiplexer = Arc::clone(&multiplexer);
        async move {
            loop {
                match receiver.recv().await {
                    Ok(trade) => {
                        let payload = TradePayload::new(&trade, multiplexer.catalog());
                        match Event::default().event("trade").json_data(&payload) {
                            Ok(event) => return Some((Ok(event), receiver)),
                            Err(e) => warn!(error = %e, "Failed to encode master stream event"),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Master stream reader lagging, trades skipped");
                        metrics::record_trades_dropped(skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct SymbologyQuery {
    asset_type: Option<String>,
}

async fn symbology_handler(
    State(state): State<AppState>,
    Query(query): Query<SymbologyQuery>,
) -> Result<Json<Vec<SymbologyEntry>>, ApiError> {
    let catalog = state.multiplexer.catalog();
    let Some(asset_type) = query.asset_type.filter(|a| !a.trim().is_empty()) else {
        let entries = catalog
            .front_contracts()
            .into_iter()
            .map(|symbol| SymbologyEntry {
                label: symbol.clone(),
                value: symbol,
            })
            .collect();
        return Ok(Json(entries));
    };

    let category = AssetCategory::parse(&asset_type).ok_or_else(|| {
        ApiError::bad_request("unknown_asset_type", format!("Unknown asset type: {asset_type}"))
    })?;
    Ok(Json(catalog.symbology(category)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::{DateTime, TimeZone};
    use rust_decimal_macros::dec;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::infrastructure::http::router;
    use crate::infrastructure::http::test_support::{app_state, get_json};
    use crate::infrastructure::upstream::ConnectionState;

    fn trade(symbol: &str, secs: i64) -> Trade {
        Trade {
            symbol: symbol.to_string(),
            timestamp: DateTime::from_timestamp(secs, 0).unwrap(),
            side: Side::Buy,
            size: 3,
            price: dec!(5012.25),
        }
    }

    #[test]
    fn parses_explicit_actions() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"action":"subscribe","symbols":["ES.c.0","NQ.c.0"]}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Action(ClientAction::Subscribe {
                symbols: vec!["ES.c.0".to_string(), "NQ.c.0".to_string()]
            })
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Action(ClientAction::Ping));
    }

    #[test]
    fn parses_dashboard_form_with_single_string() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"params":{"symbol":"ES.c.0, CL.c.0"}}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Dashboard {
                params: DashboardParams {
                    symbol: vec!["ES.c.0".to_string(), "CL.c.0".to_string()]
                }
            }
        );
    }

    #[test]
    fn trade_payload_uses_exchange_time_and_display_name() {
        let catalog = SymbolCatalog::default();
        let ts = Chicago.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap().timestamp();
        let payload = TradePayload::new(&trade("ES.c.0", ts), &catalog);

        assert_eq!(payload.date, "2024-03-01T09:30:00-0600");
        assert_eq!(payload.name, "E-mini S&P 500");
        assert!((payload.price - 5012.25).abs() < f64::EPSILON);

        let json = serde_json::to_value(ServerMessage::Trade(payload)).unwrap();
        assert_eq!(json["type"], "trade");
        assert_eq!(json["side"], "buy");
        assert_eq!(json["size"], 3);
    }

    #[test]
    fn subscribe_replies_then_seeds_on_session() {
        let state = app_state();
        let mut session = state.multiplexer.open_session();

        let replies = handle_client_text(
            &state.multiplexer,
            session.id(),
            r#"{"action":"subscribe","symbols":["ES.c.0"]}"#,
        );
        assert_eq!(
            replies,
            vec![ServerMessage::Subscribed {
                symbols: vec!["ES.c.0".to_string()]
            }]
        );

        let seed = session.try_recv().unwrap();
        assert!(matches!(seed, SessionEvent::Seed(ref t) if t.symbol == "ES.c.0" && t.is_placeholder()));
    }

    #[test]
    fn unknown_symbols_rejected_alongside_valid_ones() {
        let state = app_state();
        let session = state.multiplexer.open_session();

        let replies = handle_client_text(
            &state.multiplexer,
            session.id(),
            r#"{"action":"replace","symbols":["ES.c.0","ZZZ.c.0"]}"#,
        );

        assert_eq!(replies.len(), 2);
        assert!(matches!(&replies[0], ServerMessage::Subscribed { symbols } if symbols == &["ES.c.0"]));
        assert!(matches!(&replies[1], ServerMessage::Error { code: "unknown_symbols", .. }));
        assert_eq!(state.multiplexer.session_symbols(session.id()), vec!["ES.c.0".to_string()]);
    }

    #[test]
    fn dashboard_form_replaces_interest() {
        let state = app_state();
        let session = state.multiplexer.open_session();
        let mux = &state.multiplexer;

        handle_client_text(mux, session.id(), r#"{"action":"subscribe","symbols":["ES.c.0","NQ.c.0"]}"#);
        handle_client_text(mux, session.id(), r#"{"params":{"symbol":["CL.c.0"]}}"#);

        assert_eq!(mux.session_symbols(session.id()), vec!["CL.c.0".to_string()]);
    }

    #[test]
    fn malformed_frame_is_reported_to_sender() {
        let state = app_state();
        let session = state.multiplexer.open_session();

        let replies = handle_client_text(&state.multiplexer, session.id(), "{not json");
        assert!(matches!(&replies[..], [ServerMessage::Error { code: "invalid_message", .. }]));

        let replies = handle_client_text(&state.multiplexer, session.id(), r#"{"action":"teleport"}"#);
        assert!(matches!(&replies[..], [ServerMessage::Error { code: "invalid_message", .. }]));
    }

    #[test]
    fn closed_session_is_reported() {
        let state = app_state();
        let session = state.multiplexer.open_session();
        state.multiplexer.close_session(session.id());

        let replies = handle_client_text(
            &state.multiplexer,
            session.id(),
            r#"{"action":"unsubscribe","symbols":["ES.c.0"]}"#,
        );
        assert!(matches!(&replies[..], [ServerMessage::Error { code: "unknown_session", .. }]));
    }

    #[test]
    fn unsubscribe_acknowledges_only_released_symbols() {
        let state = app_state();
        let session = state.multiplexer.open_session();
        let mux = &state.multiplexer;
        handle_client_text(mux, session.id(), r#"{"action":"subscribe","symbols":[" ES.c.0"]}"#);

        let replies = handle_client_text(
            mux,
            session.id(),
            r#"{"action":"unsubscribe","symbols":[" ES.c.0","NQ.c.0"]}"#,
        );

        assert_eq!(
            replies,
            vec![ServerMessage::Unsubscribed {
                symbols: vec!["ES.c.0".to_string()]
            }]
        );
        assert!(mux.session_symbols(session.id()).is_empty());
        assert!(mux.active_symbols().is_empty());
    }

    #[tokio::test]
    async fn get_ws_data_returns_cached_and_placeholder_entries() {
        let state = app_state();
        state.multiplexer.publish(trade("ES.c.0", 1_700_000_000));

        let (status, json) = get_json(state.clone(), "/live/get_ws_data?symbol=ES.c.0,ZZZ.c.0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["symbol"], "ES.c.0");
        assert_eq!(json[0]["size"], 3);
        assert_eq!(json[1]["symbol"], "ZZZ.c.0");
        assert_eq!(json[1]["size"], 0);
        assert_eq!(json[1]["price"], 0.0);

        let (_, json) = get_json(state, "/live/get_ws_data").await;
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn status_reports_connection_and_streamed_symbols() {
        let state = app_state();
        state.feed_state.set_state(ConnectionState::Connected);
        let _session = state.multiplexer.open_session();

        let (status, json) = get_json(state.clone(), "/live/control/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["connected"], true);
        assert_eq!(json["active_clients"], 1);
        assert_eq!(
            json["subscribed_symbols"].as_array().unwrap().len(),
            state.multiplexer.master_symbols().len()
        );
    }

    #[tokio::test]
    async fn control_subscribe_holds_known_symbols() {
        let state = app_state();

        let (status, json) =
            get_json(state.clone(), "/live/control/subscribe?symbols=GC.c.0,%20ZZZ.c.0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["subscribed"], serde_json::json!(["GC.c.0"]));
        assert_eq!(json["rejected"], serde_json::json!(["ZZZ.c.0"]));
        assert_eq!(state.multiplexer.control_symbols(), vec!["GC.c.0".to_string()]);

        let (_, json) = get_json(state.clone(), "/live/control/status").await;
        assert_eq!(json["active_clients"], 0);
        let streamed = json["subscribed_symbols"].as_array().unwrap();
        assert!(streamed.contains(&serde_json::json!("GC.c.0")));
    }

    #[tokio::test]
    async fn control_unsubscribe_reports_released_symbols() {
        let state = app_state();
        state.multiplexer.control_subscribe(&["GC.c.0".to_string()]);

        let (status, json) =
            get_json(state.clone(), "/live/control/unsubscribe?symbols=GC.c.0,SI.c.0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["unsubscribed"], serde_json::json!(["GC.c.0"]));
        assert!(state.multiplexer.active_symbols().is_empty());

        let (_, json) = get_json(state, "/live/control/unsubscribe?symbols=GC.c.0").await;
        assert_eq!(json["unsubscribed"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn control_endpoints_require_symbols() {
        let state = app_state();
        for uri in [
            "/live/control/subscribe",
            "/live/control/unsubscribe?symbols=,%20",
        ] {
            let (status, json) = get_json(state.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["code"], "missing_symbols");
        }
    }

    #[tokio::test]
    async fn master_stream_sends_every_trade_as_sse() {
        let state = app_state();
        let response = router(state.clone())
            .oneshot(Request::get("/live/master_stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
        assert_eq!(state.master_stream.receiver_count(), 1);

        // No session follows the symbol; the stream still carries it.
        state.master_stream.publish(&trade("NQ.c.0", 1_700_000_000));

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("event: trade\n"));
        assert!(text.contains(r#""symbol":"NQ.c.0""#));
        assert!(text.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn symbology_by_category_and_unknown_category() {
        let state = app_state();

        let (status, json) = get_json(state.clone(), "/live/symbology?asset_type=energy").await;
        assert_eq!(status, StatusCode::OK);
        let values: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["value"].as_str().unwrap())
            .collect();
        assert!(values.contains(&"CL.c.0"));

        let (status, json) = get_json(state.clone(), "/live/symbology?asset_type=crypto").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "unknown_asset_type");

        let (_, json) = get_json(state, "/live/symbology").await;
        assert_eq!(json[0]["label"], json[0]["value"]);
    }
}
