//! TradingView UDF Endpoints
//!
//! Chart data in the Universal Data Feed shape, served from the bar
//! cache. Only daily, weekly, and monthly resolutions exist.
//!
//! `history` takes `from`/`to` as unix seconds, converts them to
//! exchange (America/Chicago) dates, and labels each bar with its period
//! start at exchange midnight.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::America::Chicago;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::AppState;
use crate::application::services::HistoryError;
use crate::domain::catalog::SymbolCatalog;
use crate::domain::history::{Bar, Resolution};
use crate::infrastructure::metrics;

const EXCHANGE: &str = "Globex";
const SUPPORTED_RESOLUTIONS: [&str; 3] = ["D", "W", "M"];
const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Routes mounted under `/udf`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/config", get(config_handler))
        .route("/symbols", get(symbols_handler))
        .route("/search", get(search_handler))
        .route("/history", get(history_handler))
}

// =============================================================================
// Response Types
// =============================================================================

/// Datafeed capabilities.
#[derive(Debug, Clone, Serialize)]
pub struct UdfConfig {
    /// Resolution codes.
    pub supported_resolutions: [&'static str; 3],
    /// Symbol search available.
    pub supports_search: bool,
    /// Batch symbol resolution.
    pub supports_group_request: bool,
    /// Chart marks.
    pub supports_marks: bool,
    /// Timescale marks.
    pub supports_timescale_marks: bool,
    /// Server time endpoint.
    pub supports_time: bool,
    /// Exchange filter entries.
    pub exchanges: Vec<NameValue>,
    /// Symbol type filter entries.
    pub symbols_types: Vec<NameValue>,
}

/// A `{name, value}` filter entry.
#[derive(Debug, Clone, Serialize)]
pub struct NameValue {
    /// Label.
    pub name: &'static str,
    /// Value.
    pub value: &'static str,
}

impl Default for UdfConfig {
    fn default() -> Self {
        Self {
            supported_resolutions: SUPPORTED_RESOLUTIONS,
            supports_search: true,
            supports_group_request: false,
            supports_marks: false,
            supports_timescale_marks: false,
            supports_time: false,
            exchanges: vec![NameValue {
                name: EXCHANGE,
                value: EXCHANGE,
            }],
            symbols_types: vec![NameValue {
                name: "Futures",
                value: "future",
            }],
        }
    }
}

/// Symbol metadata for the chart.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolInfo {
    /// Symbol.
    pub name: String,
    /// Symbol.
    pub ticker: String,
    /// Display name.
    pub description: String,
    /// Instrument type.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Exchange.
    pub exchange: &'static str,
    /// Listing exchange.
    pub listed_exchange: &'static str,
    /// Session time zone.
    pub timezone: &'static str,
    /// Minimum price movement numerator.
    pub minmov: u32,
    /// Price scale.
    pub pricescale: u32,
    /// Intraday bars available.
    pub has_intraday: bool,
    /// Daily bars available.
    pub has_daily: bool,
    /// Weekly and monthly bars available.
    pub has_weekly_and_monthly: bool,
    /// Resolution codes.
    pub supported_resolutions: [&'static str; 3],
    /// Quote currency.
    pub currency_code: &'static str,
    /// Original quote currency.
    pub original_currency_code: &'static str,
    /// Volume decimal places.
    pub volume_precision: u32,
}

impl SymbolInfo {
    fn new(symbol: &str, catalog: &SymbolCatalog) -> Self {
        Self {
            name: symbol.to_string(),
            ticker: symbol.to_string(),
            description: catalog.display_name(symbol),
            kind: "futures",
            exchange: EXCHANGE,
            listed_exchange: EXCHANGE,
            timezone: "America/Chicago",
            minmov: 1,
            pricescale: 100,
            has_intraday: false,
            has_daily: true,
            has_weekly_and_monthly: true,
            supported_resolutions: SUPPORTED_RESOLUTIONS,
            currency_code: "USD",
            original_currency_code: "USD",
            volume_precision: 1,
        }
    }
}

/// One symbol search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Front-month symbol.
    pub symbol: String,
    /// `Globex:<symbol>`.
    pub full_name: String,
    /// Display name.
    pub description: String,
    /// Exchange.
    pub exchange: &'static str,
    /// Listing exchange.
    pub listed_exchange: &'static str,
    /// Front-month symbol.
    pub ticker: String,
    /// Instrument type.
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// `history` response, tagged by `s`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "s", rename_all = "snake_case")]
pub enum HistoryResponse {
    /// Bars as parallel arrays.
    Ok {
        /// Bar times, unix seconds.
        t: Vec<i64>,
        /// Opens.
        o: Vec<f64>,
        /// Highs.
        h: Vec<f64>,
        /// Lows.
        l: Vec<f64>,
        /// Closes.
        c: Vec<f64>,
        /// Volumes.
        v: Vec<u64>,
    },
    /// No bars in the requested range.
    NoData,
}

impl HistoryResponse {
    fn from_bars(bars: &[Bar]) -> Self {
        if bars.is_empty() {
            return Self::NoData;
        }
        let price = |value: Decimal| value.to_f64().unwrap_or_default();
        Self::Ok {
            t: bars.iter().map(|b| exchange_midnight(b.time)).collect(),
            o: bars.iter().map(|b| price(b.open)).collect(),
            h: bars.iter().map(|b| price(b.high)).collect(),
            l: bars.iter().map(|b| price(b.low)).collect(),
            c: bars.iter().map(|b| price(b.close)).collect(),
            v: bars.iter().map(|b| b.volume).collect(),
        }
    }
}

/// UDF error body, `{"s":"error","errmsg":...}`.
#[derive(Debug, Clone)]
pub struct UdfError {
    status: StatusCode,
    errmsg: String,
}

impl UdfError {
    fn bad_request(errmsg: impl Into<String>) -> Self {
        metrics::record_client_error("udf_bad_request");
        Self {
            status: StatusCode::BAD_REQUEST,
            errmsg: errmsg.into(),
        }
    }
}

impl From<HistoryError> for UdfError {
    fn from(err: HistoryError) -> Self {
        if matches!(
            err,
            HistoryError::UnknownSymbol { .. } | HistoryError::InvalidRange { .. }
        ) {
            return Self::bad_request(err.to_string());
        }
        let status = if err.is_retryable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::BAD_GATEWAY
        };
        warn!(error = %err, "History request failed");
        Self {
            status,
            errmsg: err.to_string(),
        }
    }
}

impl IntoResponse for UdfError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "s": "error", "errmsg": self.errmsg });
        (self.status, Json(body)).into_response()
    }
}

// =============================================================================
// Time Conversion
// =============================================================================

/// Unix seconds of midnight on `date` in the exchange time zone.
fn exchange_midnight(date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    Chicago
        .from_local_datetime(&midnight)
        .earliest()
        .map_or_else(|| midnight.and_utc().timestamp(), |dt| dt.timestamp())
}

/// Exchange-local date of a unix timestamp.
fn exchange_date(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.with_timezone(&Chicago).date_naive())
}

/// Strip an `EXCHANGE:` prefix.
fn bare_symbol(symbol: &str) -> &str {
    let symbol = symbol.trim();
    symbol
        .split_once(':')
        .map_or(symbol, |(_, ticker)| ticker.trim())
}

// =============================================================================
// Handlers
// =============================================================================

async fn config_handler() -> Json<UdfConfig> {
    Json(UdfConfig::default())
}

#[derive(Debug, Deserialize)]
struct SymbolQuery {
    #[serde(default)]
    symbol: String,
}

async fn symbols_handler(
    State(state): State<AppState>,
    Query(query): Query<SymbolQuery>,
) -> Result<Json<SymbolInfo>, UdfError> {
    let catalog = state.multiplexer.catalog();
    let symbol = bare_symbol(&query.symbol);
    if !catalog.is_known(symbol) {
        return Err(UdfError::bad_request(format!("unknown_symbol: {symbol}")));
    }
    Ok(Json(SymbolInfo::new(symbol, catalog)))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    query: String,
    limit: Option<usize>,
}

async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<SearchResult>> {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let results = state
        .multiplexer
        .catalog()
        .search(&query.query, limit)
        .into_iter()
        .map(|instrument| {
            let symbol = instrument.front_contract();
            SearchResult {
                full_name: format!("{EXCHANGE}:{symbol}"),
                description: instrument.name.to_string(),
                exchange: EXCHANGE,
                listed_exchange: EXCHANGE,
                ticker: symbol.clone(),
                symbol,
                kind: "future",
            }
        })
        .collect();
    Json(results)
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    symbol: String,
    resolution: Option<String>,
    from: Option<i64>,
    to: Option<i64>,
    countback: Option<usize>,
}

async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, UdfError> {
    let resolution = query
        .resolution
        .as_deref()
        .unwrap_or("D")
        .parse::<Resolution>()
        .map_err(|e| UdfError::bad_request(e.to_string()))?;

    let (Some(from), Some(to)) = (query.from, query.to) else {
        return Err(UdfError::bad_request("from and to are required"));
    };
    let (Some(start), Some(end)) = (exchange_date(from), exchange_date(to)) else {
        return Err(UdfError::bad_request("timestamp out of range"));
    };

    let bars = state
        .history
        .bars(bare_symbol(&query.symbol), resolution, start, end)
        .await?;

    let skip = query
        .countback
        .map_or(0, |count| bars.len().saturating_sub(count));
    Ok(Json(HistoryResponse::from_bars(&bars[skip..])))
}

// =============================================================================
// Tests
// =============================================================================
