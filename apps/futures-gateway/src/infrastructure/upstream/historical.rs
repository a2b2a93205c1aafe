//! Historical Bar Source
//!
//! HTTP client for the vendor's daily bar API.
//!
//! `GET {base}/v1/bars/daily?symbol=ES.c.0&start=2024-01-02&end=2024-01-31`
//! with `Authorization: Bearer <key>`, answered by a JSON array of
//! `{date, open, high, low, close, volume}` objects.
//!
//! HTTP 429 is retried with backoff, honoring `Retry-After`, until the retry
//! budget runs out.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::auth::ApiKey;
use super::backoff::{Backoff, BackoffConfig};
use crate::application::ports::{HistoricalSourceError, HistoricalSourcePort};
use crate::domain::history::{DailyBar, DateRange};

/// Configuration for [`HttpHistoricalSource`].
#[derive(Debug, Clone)]
pub struct HistoricalSourceConfig {
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Vendor API key.
    pub api_key: ApiKey,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Rate-limit retries before giving up.
    pub max_retries: u32,
    /// Delay schedule between rate-limit retries.
    pub backoff: BackoffConfig,
}

impl HistoricalSourceConfig {
    /// Configuration with default timeout and retry budget.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(15),
            max_retries: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BarRecord {
    date: NaiveDate,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: u64,
}

/// Daily bar source backed by the vendor's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpHistoricalSource {
    client: Client,
    config: HistoricalSourceConfig,
}

impl HttpHistoricalSource {
    /// Build the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(config: HistoricalSourceConfig) -> Result<Self, HistoricalSourceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HistoricalSourceError::Transport {
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    fn retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl HistoricalSourcePort for HttpHistoricalSource {
    async fn fetch_daily_bars(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<Vec<DailyBar>, HistoricalSourceError> {
        let url = format!("{}/v1/bars/daily", self.config.base_url);
        let start = range.start.format("%Y-%m-%d").to_string();
        let end = range.end.format("%Y-%m-%d").to_string();
        let mut backoff = Backoff::new(self.config.backoff.clone());
        let mut retries = 0;

        loop {
            let response = self
                .client
                .get(&url)
                .bearer_auth(self.config.api_key.expose())
                .query(&[("symbol", symbol), ("start", start.as_str()), ("end", end.as_str())])
                .send()
                .await
                .map_err(|e| HistoricalSourceError::Transport {
                    message: e.to_string(),
                })?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = Self::retry_after(&response);
                if retries >= self.config.max_retries {
                    return Err(HistoricalSourceError::RateLimited { retry_after });
                }
                let Some(scheduled) = backoff.next_delay() else {
                    return Err(HistoricalSourceError::RateLimited { retry_after });
                };
                let delay = retry_after.map_or(scheduled, |d| d.min(self.config.backoff.max_delay));
                retries += 1;
                tracing::warn!(
                    symbol,
                    %range,
                    attempt = retries,
                    delay_ms = delay.as_millis(),
                    "Historical source rate limited, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(HistoricalSourceError::Status {
                    status: status.as_u16(),
                    message,
                });
            }

            let text = response
                .text()
                .await
                .map_err(|e| HistoricalSourceError::Transport {
                    message: e.to_string(),
                })?;
            let records: Vec<BarRecord> =
                serde_json::from_str(&text).map_err(|e| HistoricalSourceError::Decode {
                    message: e.to_string(),
                })?;

            let mut bars: Vec<DailyBar> = records
                .into_iter()
                .map(|r| DailyBar {
                    symbol: symbol.to_string(),
                    date: r.date,
                    open: r.open,
                    high: r.high,
                    low: r.low,
                    close: r.close,
                    volume: r.volume,
                })
                .collect();
            bars.sort_by_key(|b| b.date);

            tracing::debug!(symbol, %range, count = bars.len(), "Fetched daily bars");
            return Ok(bars);
        }
    }
}
