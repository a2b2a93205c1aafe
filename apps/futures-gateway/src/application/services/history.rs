//! Historical Bar Service
//!
//! Serves daily, weekly, and monthly bars from the [`BarCache`], fetching
//! missing daily data from the historical vendor.
//!
//! # Freshness
//!
//! Days before the current exchange day (America/Chicago) are immutable
//! once fetched. The current day is never marked complete and is fetched
//! again on each request that covers it. Requested days after the
//! current day are never fetched.
//!
//! # Deduplication
//!
//! Concurrent requests needing the same `(symbol, range)` share one vendor
//! fetch. Fetches run on their own task, so a caller that gives up does
//! not cancel the fetch for the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use chrono_tz::America::Chicago;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, try_join_all};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::application::ports::{HistoricalSourceError, HistoricalSourcePort};
use crate::domain::catalog::SymbolCatalog;
use crate::domain::history::{Bar, BarCache, DateRange, Resolution};
use crate::domain::streaming::Symbol;
use crate::infrastructure::metrics;

/// History service error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// The symbol is not in the catalog.
    #[error("Unknown symbol: {symbol}")]
    UnknownSymbol {
        /// Requested symbol.
        symbol: String,
    },

    /// The requested range is empty or malformed.
    #[error("Invalid range: {message}")]
    InvalidRange {
        /// Error details.
        message: String,
    },

    /// The vendor fetch failed.
    #[error(transparent)]
    Upstream(#[from] HistoricalSourceError),

    /// The fetch task ended without a result.
    #[error("Fetch task aborted: {message}")]
    Aborted {
        /// Error details.
        message: String,
    },
}

impl HistoryError {
    /// True when the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream(err) => err.is_retryable(),
            Self::Aborted { .. } => true,
            Self::UnknownSymbol { .. } | Self::InvalidRange { .. } => false,
        }
    }
}

/// Source of the current exchange date.
pub type ExchangeClock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Current date in the exchange time zone.
#[must_use]
pub fn exchange_today() -> NaiveDate {
    Utc::now().with_timezone(&Chicago).date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    symbol: Symbol,
    range: DateRange,
}

type SharedFetch = Shared<BoxFuture<'static, Result<(), HistoryError>>>;
type InflightMap = Arc<Mutex<HashMap<FetchKey, SharedFetch>>>;

/// Cached access to historical bars.
pub struct HistoryService {
    catalog: Arc<SymbolCatalog>,
    source: Arc<dyn HistoricalSourcePort>,
    cache: Arc<BarCache>,
    inflight: InflightMap,
    today: ExchangeClock,
}

impl std::fmt::Debug for HistoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryService")
            .field("cache", &self.cache.stats())
            .field("inflight", &self.inflight.lock().len())
            .finish_non_exhaustive()
    }
}

impl HistoryService {
    /// Create a service using the exchange clock.
    #[must_use]
    pub fn new(
        catalog: Arc<SymbolCatalog>,
        source: Arc<dyn HistoricalSourcePort>,
        cache: Arc<BarCache>,
    ) -> Self {
        Self {
            catalog,
            source,
            cache,
            inflight: Arc::new(Mutex::new(HashMap::new())),
            today: Arc::new(exchange_today),
        }
    }

    /// Replace the clock used to decide which day is still open.
    #[must_use]
    pub fn with_clock(mut self, today: ExchangeClock) -> Self {
        self.today = today;
        self
    }

    /// Underlying cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<BarCache> {
        &self.cache
    }

    /// Fetches currently in flight.
    #[must_use]
    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Bars for `symbol` at `resolution` over the inclusive date range.
    pub async fn bars(
        &self,
        symbol: &str,
        resolution: Resolution,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Arc<[Bar]>, HistoryError> {
        if !self.catalog.is_known(symbol) {
            return Err(HistoryError::UnknownSymbol {
                symbol: symbol.to_string(),
            });
        }
        let range = DateRange::new(start, end).ok_or_else(|| HistoryError::InvalidRange {
            message: format!("start {start} is after end {end}"),
        })?;

        let today = (self.today)();
        if let Some(fetchable) = range.clamp_end(today) {
            self.ensure_cached(symbol, fetchable, today).await?;
        }

        let (bars, hit) = self.cache.bars(symbol, resolution, range);
        if resolution != Resolution::Daily {
            metrics::record_rollup_lookup(hit);
        }
        Ok(bars)
    }

    async fn ensure_cached(&self, symbol: &str, range: DateRange, today: NaiveDate) -> Result<(), HistoryError> {
        let fetches = self.plan_fetches(symbol, range, today);
        if fetches.is_empty() {
            return Ok(());
        }
        try_join_all(fetches).await.map(|_| ())
    }

    fn plan_fetches(&self, symbol: &str, range: DateRange, today: NaiveDate) -> Vec<SharedFetch> {
        let mut inflight = self.inflight.lock();
        self.cache
            .missing_ranges(symbol, range)
            .into_iter()
            .map(|missing| {
                let key = FetchKey {
                    symbol: symbol.to_string(),
                    range: missing,
                };
                if let Some(fetch) = inflight.get(&key) {
                    metrics::record_history_dedup();
                    debug!(symbol, range = %missing, "Joining in-flight fetch");
                    return fetch.clone();
                }
                let fetch = self.spawn_fetch(key.clone(), today);
                inflight.insert(key, fetch.clone());
                fetch
            })
            .collect()
    }

    fn spawn_fetch(&self, key: FetchKey, today: NaiveDate) -> SharedFetch {
        let source = Arc::clone(&self.source);
        let cache = Arc::clone(&self.cache);
        let inflight = Arc::clone(&self.inflight);

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = source.fetch_daily_bars(&key.symbol, key.range).await;

            let outcome = match result {
                Ok(bars) => {
                    let merged = cache.merge(&key.symbol, bars, key.range, today.pred_opt());
                    metrics::record_history_fetch("ok", started.elapsed());
                    debug!(
                        symbol = %key.symbol,
                        range = %key.range,
                        inserted = merged.inserted,
                        replaced = merged.replaced,
                        "Fetched daily bars"
                    );
                    Ok(())
                }
                Err(err) => {
                    metrics::record_history_fetch("error", started.elapsed());
                    warn!(symbol = %key.symbol, range = %key.range, error = %err, "Daily bar fetch failed");
                    Err(HistoryError::from(err))
                }
            };

            inflight.lock().remove(&key);
            outcome
        });

        async move {
            task.await.unwrap_or_else(|err| {
                Err(HistoryError::Aborted {
                    message: err.to_string(),
                })
            })
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::history::DailyBar;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Returns one bar per weekday in the requested range.
    struct CountingSource {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HistoricalSourcePort for CountingSource {
        async fn fetch_daily_bars(
            &self,
            symbol: &str,
            range: DateRange,
        ) -> Result<Vec<DailyBar>, HistoricalSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(HistoricalSourceError::Status {
                    status: 503,
                    message: "maintenance".to_string(),
                });
            }
            let bars = range
                .start
                .iter_days()
                .take_while(|d| *d <= range.end)
                .filter(|d| chrono::Datelike::weekday(d).num_days_from_monday() < 5)
                .map(|d| DailyBar {
                    symbol: symbol.to_string(),
                    date: d,
                    open: Decimal::from(10),
                    high: Decimal::from(12),
                    low: Decimal::from(9),
                    close: Decimal::from(11),
                    volume: 100,
                })
                .collect();
            Ok(bars)
        }
    }

    fn service(source: Arc<CountingSource>, today: NaiveDate) -> Arc<HistoryService> {
        Arc::new(
            HistoryService::new(Arc::new(SymbolCatalog::default()), source, Arc::new(BarCache::new(64)))
                .with_clock(Arc::new(move || today)),
        )
    }

    #[tokio::test]
    async fn past_range_is_fetched_once() {
        let source = CountingSource::new(Duration::ZERO);
        let svc = service(Arc::clone(&source), date(2024, 6, 1));

        let first = svc.bars("ES.c.0", Resolution::Daily, date(2024, 1, 1), date(2024, 1, 31)).await.unwrap();
        let second = svc.bars("ES.c.0", Resolution::Daily, date(2024, 1, 8), date(2024, 1, 12)).await.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(first.len(), 23);
        assert_eq!(second.len(), 5);
    }

    #[tokio::test]
    async fn current_day_is_refetched() {
        let source = CountingSource::new(Duration::ZERO);
        let today = date(2024, 1, 10);
        let svc = service(Arc::clone(&source), today);

        svc.bars("ES.c.0", Resolution::Daily, date(2024, 1, 1), today).await.unwrap();
        svc.bars("ES.c.0", Resolution::Daily, date(2024, 1, 1), today).await.unwrap();

        assert_eq!(source.calls(), 2);
        assert_eq!(svc.cache().missing_ranges("ES.c.0", DateRange::new(date(2024, 1, 1), today).unwrap()), vec![DateRange::day(today)]);
    }

    #[tokio::test]
    async fn future_days_are_not_fetched() {
        let source = CountingSource::new(Duration::ZERO);
        let svc = service(Arc::clone(&source), date(2024, 1, 10));

        let bars = svc.bars("ES.c.0", Resolution::Daily, date(2024, 2, 1), date(2024, 2, 28)).await.unwrap();

        assert!(bars.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let source = CountingSource::new(Duration::from_millis(50));
        let svc = service(Arc::clone(&source), date(2024, 6, 1));

        let requests = (0..10).map(|_| {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move {
                svc.bars("CL.c.0", Resolution::Weekly, date(2024, 1, 1), date(2024, 3, 31)).await
            })
        });
        let results = futures::future::join_all(requests).await;

        assert_eq!(source.calls(), 1);
        let first = results[0].as_ref().unwrap().as_ref().unwrap().clone();
        for result in results {
            assert_eq!(result.unwrap().unwrap(), first);
        }
        assert_eq!(svc.inflight_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_request_does_not_cancel_fetch() {
        let source = CountingSource::new(Duration::from_millis(50));
        let svc = service(Arc::clone(&source), date(2024, 6, 1));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            svc.bars("GC.c.0", Resolution::Daily, date(2024, 1, 1), date(2024, 1, 31)),
        )
        .await;
        assert!(abandoned.is_err());

        let bars = svc.bars("GC.c.0", Resolution::Daily, date(2024, 1, 1), date(2024, 1, 31)).await.unwrap();
        assert_eq!(bars.len(), 23);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_reported_and_retried_next_time() {
        let source = CountingSource::failing();
        let svc = service(Arc::clone(&source), date(2024, 6, 1));

        let err = svc.bars("ES.c.0", Resolution::Daily, date(2024, 1, 1), date(2024, 1, 5)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(svc.inflight_count(), 0);

        let _ = svc.bars("ES.c.0", Resolution::Daily, date(2024, 1, 1), date(2024, 1, 5)).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn weekly_bars_are_labeled_by_monday() {
        let source = CountingSource::new(Duration::ZERO);
        let svc = service(source, date(2024, 6, 1));

        let weekly = svc.bars("ES.c.0", Resolution::Weekly, date(2024, 1, 1), date(2024, 1, 14)).await.unwrap();

        let labels: Vec<NaiveDate> = weekly.iter().map(|b| b.time).collect();
        assert_eq!(labels, vec![date(2024, 1, 1), date(2024, 1, 8)]);
        assert_eq!(weekly[0].volume, 500);
    }

    #[tokio::test]
    async fn rejects_unknown_symbol_and_inverted_range() {
        let source = CountingSource::new(Duration::ZERO);
        let svc = service(Arc::clone(&source), date(2024, 6, 1));

        assert!(matches!(
            svc.bars("XX.c.0", Resolution::Daily, date(2024, 1, 1), date(2024, 1, 2)).await,
            Err(HistoryError::UnknownSymbol { .. })
        ));
        assert!(matches!(
            svc.bars("ES.c.0", Resolution::Daily, date(2024, 1, 2), date(2024, 1, 1)).await,
            Err(HistoryError::InvalidRange { .. })
        ));
        assert_eq!(source.calls(), 0);
    }
}
