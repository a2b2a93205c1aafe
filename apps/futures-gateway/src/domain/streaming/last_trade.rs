//! Per-symbol last-trade cache.
//!
//! Holds the most recent trade for every symbol that has been followed or
//! pre-seeded. Entries are never evicted; the symbol universe is a fixed
//! catalog so growth is bounded by the number of distinct contracts
//! clients ask for.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{Symbol, Trade};

/// Result of recording a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The cache now holds this trade.
    Updated,
    /// The trade is older than the cached one and was not stored.
    Stale,
}

/// Last trade per symbol.
#[derive(Debug, Default)]
pub struct LastTradeCache {
    entries: RwLock<HashMap<Symbol, Trade>>,
}

impl LastTradeCache {
    /// Create a cache pre-seeded with placeholders.
    #[must_use]
    pub fn seeded(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        let entries = symbols
            .into_iter()
            .map(|s| (s.clone(), Trade::placeholder(s)))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Store a trade unless it is older than the cached entry.
    ///
    /// Equal timestamps replace; the vendor emits several prints per
    /// nanosecond on busy contracts and the later arrival wins.
    pub fn record(&self, trade: &Trade) -> RecordOutcome {
        let mut entries = self.entries.write();
        match entries.get_mut(&trade.symbol) {
            Some(existing) if !existing.is_placeholder() && trade.timestamp < existing.timestamp => {
                RecordOutcome::Stale
            }
            Some(existing) => {
                existing.clone_from(trade);
                RecordOutcome::Updated
            }
            None => {
                entries.insert(trade.symbol.clone(), trade.clone());
                RecordOutcome::Updated
            }
        }
    }

    /// Current entry for a symbol, inserting a placeholder if absent.
    pub fn get_or_seed(&self, symbol: &str) -> Trade {
        if let Some(trade) = self.entries.read().get(symbol) {
            return trade.clone();
        }
        self.entries
            .write()
            .entry(symbol.to_string())
            .or_insert_with(|| Trade::placeholder(symbol))
            .clone()
    }

    /// Current entry for a symbol without seeding.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Trade> {
        self.entries.read().get(symbol).cloned()
    }

    /// Entries for several symbols, seeding any that are absent.
    pub fn snapshot(&self, symbols: &[Symbol]) -> Vec<Trade> {
        symbols.iter().map(|s| self.get_or_seed(s)).collect()
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
