//! Daily bar store with coverage tracking and memoized rollups.
//!
//! Daily bars are the source of truth. Weekly and monthly bars are derived
//! on demand and memoized per `(symbol, resolution, range)`. Every daily
//! bar carries the revision at which it was last written; a memoized
//! rollup is reused only while no daily bar inside its range has a newer
//! revision.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;

use super::{Bar, DailyBar, DateRange, Resolution, aggregate};
use crate::domain::streaming::Symbol;

/// Key of a memoized rollup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateKey {
    /// Continuous-contract symbol.
    pub symbol: Symbol,
    /// Target resolution.
    pub resolution: Resolution,
    /// Requested date range.
    pub range: DateRange,
}

/// Counts from merging a batch of fetched bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Dates not previously cached.
    pub inserted: usize,
    /// Dates whose values changed.
    pub replaced: usize,
    /// Dates that matched the cached values.
    pub unchanged: usize,
}

impl MergeOutcome {
    /// True when any cached value changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.inserted > 0 || self.replaced > 0
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarCacheStats {
    /// Symbols with any cached data.
    pub symbols: usize,
    /// Daily bars held across all symbols.
    pub daily_bars: usize,
    /// Memoized rollups held.
    pub aggregates: usize,
    /// When the oldest covered range was fetched. Covered ranges are never
    /// refetched, so this is the age of the stalest data served.
    pub oldest_coverage: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct Coverage {
    range: DateRange,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct DailySeries {
    bars: BTreeMap<NaiveDate, DailyBar>,
    revisions: BTreeMap<NaiveDate, u64>,
    /// Sorted, non-touching ranges known to be complete.
    coverage: Vec<Coverage>,
}

impl DailySeries {
    fn revision_of(&self, range: DateRange) -> u64 {
        self.revisions
            .range(range.start..=range.end)
            .map(|(_, rev)| *rev)
            .max()
            .unwrap_or(0)
    }

    fn cover(&mut self, range: DateRange, fetched_at: DateTime<Utc>) {
        self.coverage.push(Coverage { range, fetched_at });
        self.coverage.sort_by_key(|c| c.range.start);

        let mut merged: Vec<Coverage> = Vec::with_capacity(self.coverage.len());
        for next in self.coverage.drain(..) {
            match merged.last_mut() {
                Some(last) if last.range.touches(&next.range) => {
                    last.range.end = last.range.end.max(next.range.end);
                    last.fetched_at = last.fetched_at.min(next.fetched_at);
                }
                _ => merged.push(next),
            }
        }
        self.coverage = merged;
    }

    fn missing(&self, range: DateRange) -> Vec<DateRange> {
        let mut missing = Vec::new();
        let mut cursor = Some(range.start);

        for covered in &self.coverage {
            let Some(from) = cursor else { break };
            if covered.range.end < from {
                continue;
            }
            if covered.range.start > range.end {
                break;
            }
            if covered.range.start > from {
                let gap_end = covered.range.start.pred_opt().unwrap_or(from).min(range.end);
                missing.extend(DateRange::new(from, gap_end));
            }
            cursor = covered.range.end.succ_opt().filter(|d| *d <= range.end);
        }

        if let Some(from) = cursor {
            missing.extend(DateRange::new(from, range.end));
        }
        missing
    }
}

#[derive(Debug)]
struct AggregateEntry {
    bars: Arc<[Bar]>,
    revision: u64,
    last_access: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    series: HashMap<Symbol, DailySeries>,
    aggregates: HashMap<AggregateKey, AggregateEntry>,
    next_revision: u64,
    access_clock: u64,
}

/// In-memory historical bar cache.
#[derive(Debug)]
pub struct BarCache {
    state: RwLock<CacheState>,
    max_aggregates: usize,
}

impl BarCache {
    /// Create a cache holding at most `max_aggregates` memoized rollups.
    #[must_use]
    pub fn new(max_aggregates: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            max_aggregates,
        }
    }

    /// Sub-ranges of `range` not yet known to be complete for `symbol`.
    #[must_use]
    pub fn missing_ranges(&self, symbol: &str, range: DateRange) -> Vec<DateRange> {
        self.state
            .read()
            .series
            .get(symbol)
            .map_or_else(|| vec![range], |series| series.missing(range))
    }

    /// Ranges known to be complete for `symbol`.
    #[must_use]
    pub fn coverage(&self, symbol: &str) -> Vec<DateRange> {
        self.state
            .read()
            .series
            .get(symbol)
            .map(|s| s.coverage.iter().map(|c| c.range).collect())
            .unwrap_or_default()
    }

    /// Merge fetched daily bars and record coverage.
    ///
    /// `fetched` is the range that was requested from the vendor. Only the
    /// part of it up to and including `complete_through` is marked as
    /// covered; later days may still change and will be fetched again.
    pub fn merge(
        &self,
        symbol: &str,
        bars: Vec<DailyBar>,
        fetched: DateRange,
        complete_through: Option<NaiveDate>,
    ) -> MergeOutcome {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let series = state.series.entry(symbol.to_string()).or_default();
        let mut outcome = MergeOutcome::default();

        for bar in bars {
            let date = bar.date;
            match series.bars.get(&date) {
                Some(existing) if *existing == bar => {
                    outcome.unchanged += 1;
                    continue;
                }
                Some(_) => outcome.replaced += 1,
                None => outcome.inserted += 1,
            }
            state.next_revision += 1;
            series.revisions.insert(date, state.next_revision);
            series.bars.insert(date, bar);
        }

        if let Some(covered) = complete_through.and_then(|last| fetched.clamp_end(last)) {
            series.cover(covered, Utc::now());
        }

        outcome
    }

    /// Cached daily bars for `symbol` inside `range`, sorted by date.
    #[must_use]
    pub fn daily_bars(&self, symbol: &str, range: DateRange) -> Vec<DailyBar> {
        self.state
            .read()
            .series
            .get(symbol)
            .map(|s| s.bars.range(range.start..=range.end).map(|(_, b)| b.clone()).collect())
            .unwrap_or_default()
    }

    /// Bars for `symbol` at `resolution` over `range`.
    ///
    /// Returns the bars and whether a memoized rollup was reused. Daily
    /// resolution is never memoized.
    pub fn bars(&self, symbol: &str, resolution: Resolution, range: DateRange) -> (Arc<[Bar]>, bool) {
        if resolution == Resolution::Daily {
            let daily = self.daily_bars(symbol, range);
            return (daily.iter().map(Bar::from).collect(), false);
        }

        let key = AggregateKey {
            symbol: symbol.to_string(),
            resolution,
            range,
        };

        let mut guard = self.state.write();
        let state = &mut *guard;
        state.access_clock += 1;
        let now = state.access_clock;

        let series = state.series.get(symbol);
        let revision = series.map_or(0, |s| s.revision_of(range));

        if let Some(entry) = state.aggregates.get_mut(&key) {
            if entry.revision == revision {
                entry.last_access = now;
                return (Arc::clone(&entry.bars), true);
            }
        }

        let daily: Vec<DailyBar> = series
            .map(|s| s.bars.range(range.start..=range.end).map(|(_, b)| b.clone()).collect())
            .unwrap_or_default();
        let bars: Arc<[Bar]> = aggregate(&daily, resolution).into();

        if self.max_aggregates > 0 {
            state.aggregates.insert(
                key,
                AggregateEntry {
                    bars: Arc::clone(&bars),
                    revision,
                    last_access: now,
                },
            );
            while state.aggregates.len() > self.max_aggregates {
                let Some(oldest) = state
                    .aggregates
                    .iter()
                    .min_by_key(|(_, e)| e.last_access)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                state.aggregates.remove(&oldest);
            }
        }

        (bars, false)
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> BarCacheStats {
        let state = self.state.read();
        BarCacheStats {
            symbols: state.series.len(),
            daily_bars: state.series.values().map(|s| s.bars.len()).sum(),
            aggregates: state.aggregates.len(),
            oldest_coverage: state
                .series
                .values()
                .flat_map(|s| s.coverage.iter().map(|c| c.fetched_at))
                .min(),
        }
    }
}
