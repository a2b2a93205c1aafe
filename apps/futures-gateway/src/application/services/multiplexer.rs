//! Live Trade Multiplexer
//!
//! Fans trades from the single upstream connection out to every client
//! session following the symbol, keeps the last-trade cache current, and
//! turns session interest changes into upstream subscribe/unsubscribe
//! calls through the registry.
//!
//! Interest registered over the REST control endpoints is held by a
//! synthetic session, [`CONTROL_SESSION`], which has no channel. It shares
//! the reference counts with client sessions but never receives events.
//!
//! # Ordering
//!
//! Seeds and live trades for a session are sent under the same fan-out
//! lock, so a seed never overtakes a newer live trade for that symbol.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::session::{ClientSession, SessionSender};
use crate::application::ports::FeedControlPort;
use crate::domain::catalog::SymbolCatalog;
use crate::domain::streaming::{LastTradeCache, RecordOutcome, SessionEvent, Symbol, Trade};
use crate::domain::subscription::{
    RegistryStats, SessionId, SubscriptionChanges, SubscriptionRegistry,
};
use crate::infrastructure::metrics;

/// Registry id of the interest held through the REST control endpoints.
pub const CONTROL_SESSION: SessionId = 0;

// =============================================================================
// Errors and Outcomes
// =============================================================================

/// Live multiplexer error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiveError {
    /// The session is not open.
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    /// Symbols outside the catalog were requested.
    #[error("Unknown symbols: {}", .0.join(", "))]
    UnknownSymbols(Vec<String>),
}

/// Result of a subscribe or replace request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOutcome {
    /// Symbols now followed by the session.
    pub accepted: Vec<Symbol>,
    /// Requested symbols that are not in the catalog.
    pub rejected: Vec<String>,
}

impl SubscribeOutcome {
    /// Error describing rejected symbols, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<LiveError> {
        (!self.rejected.is_empty()).then(|| LiveError::UnknownSymbols(self.rejected.clone()))
    }
}

/// Result of publishing a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Trade was cached and handed to this many sessions.
    Delivered(usize),
    /// Trade was older than the cached one and was discarded.
    Stale,
}

/// Multiplexer configuration.
#[derive(Debug, Clone, Copy)]
pub struct MultiplexerConfig {
    /// Per-session channel capacity.
    pub session_buffer: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            session_buffer: 256,
        }
    }
}

/// Multiplexer statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiplexerStats {
    /// Open sessions.
    pub sessions: usize,
    /// Registry statistics.
    pub registry: RegistryStats,
    /// Symbols in the last-trade cache.
    pub cached_symbols: usize,
    /// Trades accepted since startup.
    pub trades_published: u64,
    /// Out-of-order trades discarded since startup.
    pub trades_stale: u64,
}

// =============================================================================
// Multiplexer
// =============================================================================

/// Routes upstream trades to client sessions.
pub struct LiveMultiplexer {
    catalog: Arc<SymbolCatalog>,
    registry: SubscriptionRegistry,
    last_trades: LastTradeCache,
    feed: Arc<dyn FeedControlPort>,
    sessions: RwLock<HashMap<SessionId, SessionSender>>,
    fanout: Mutex<()>,
    config: MultiplexerConfig,
    master: Vec<Symbol>,
    trades_published: AtomicU64,
    trades_stale: AtomicU64,
}

impl std::fmt::Debug for LiveMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMultiplexer")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl LiveMultiplexer {
    /// Create a multiplexer whose last-trade cache is pre-seeded with the
    /// catalog's front-month contracts.
    #[must_use]
    pub fn new(
        catalog: Arc<SymbolCatalog>,
        feed: Arc<dyn FeedControlPort>,
        config: MultiplexerConfig,
    ) -> Self {
        let master = catalog.front_contracts();
        let last_trades = LastTradeCache::seeded(master.clone());
        Self {
            catalog,
            registry: SubscriptionRegistry::new(),
            last_trades,
            feed,
            sessions: RwLock::new(HashMap::new()),
            fanout: Mutex::new(()),
            config,
            master,
            trades_published: AtomicU64::new(0),
            trades_stale: AtomicU64::new(0),
        }
    }

    /// Override the symbols streamed upstream regardless of demand.
    #[must_use]
    pub fn with_master_symbols(mut self, mut symbols: Vec<Symbol>) -> Self {
        symbols.sort();
        symbols.dedup();
        self.master = symbols;
        self
    }

    /// Symbol catalog.
    #[must_use]
    pub fn catalog(&self) -> &SymbolCatalog {
        &self.catalog
    }

    /// Open a new client session.
    pub fn open_session(&self) -> ClientSession {
        let mut sessions = self.sessions.write();
        let id = loop {
            let candidate = uuid::Uuid::new_v4().as_u64_pair().0;
            if candidate != CONTROL_SESSION && !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let (sender, session) = ClientSession::channel(id, self.config.session_buffer);
        sessions.insert(id, sender);
        metrics::set_sessions(sessions.len());
        debug!(session_id = id, "Session opened");
        session
    }

    /// Close a session and release every symbol it followed.
    pub fn close_session(&self, session: SessionId) {
        let changes = self
            .registry
            .session_closed_with(session, |changes| self.apply_unsubscribe(changes));
        let mut sessions = self.sessions.write();
        if sessions.remove(&session).is_some() {
            metrics::set_sessions(sessions.len());
            debug!(
                session_id = session,
                released = changes.unsubscribe.len(),
                "Session closed"
            );
        }
    }

    /// Follow additional symbols.
    ///
    /// Known symbols are followed and seeded with their last trade even
    /// when the request also names unknown ones.
    pub fn subscribe(&self, session: SessionId, symbols: &[String]) -> Result<SubscribeOutcome, LiveError> {
        let sender = self.sender(session)?;
        let outcome = self.partition(symbols);

        let _fanout = self.fanout.lock();
        self.registry
            .add_interest_with(session, &outcome.accepted, |changes| self.apply_subscribe(changes));
        self.send_seeds(&sender, &outcome.accepted);

        Ok(outcome)
    }

    /// Stop following symbols and return the ones the session actually
    /// followed. Symbols are trimmed like on subscribe; the rest are ignored.
    pub fn unsubscribe(&self, session: SessionId, symbols: &[String]) -> Result<Vec<Symbol>, LiveError> {
        self.sender(session)?;
        Ok(self.release(session, symbols))
    }

    /// Replace the session's whole interest set.
    ///
    /// Only symbols the session did not already follow are seeded.
    pub fn replace_interest(
        &self,
        session: SessionId,
        symbols: &[String],
    ) -> Result<SubscribeOutcome, LiveError> {
        let sender = self.sender(session)?;
        let outcome = self.partition(symbols);

        let _fanout = self.fanout.lock();
        let update = self.registry.replace_interest_with(session, &outcome.accepted, |changes| {
            self.apply_unsubscribe(changes);
            self.apply_subscribe(changes);
        });
        self.send_seeds(&sender, &update.added);

        Ok(outcome)
    }

    /// Hold known symbols on the upstream feed without a client session.
    ///
    /// Unknown symbols are reported in the outcome and otherwise ignored.
    pub fn control_subscribe(&self, symbols: &[String]) -> SubscribeOutcome {
        let outcome = self.partition(symbols);
        self.registry
            .add_interest_with(CONTROL_SESSION, &outcome.accepted, |changes| {
                self.apply_subscribe(changes);
            });
        info!(symbols = ?outcome.accepted, "Control subscribe");
        outcome
    }

    /// Drop control interest and return the symbols it released.
    pub fn control_unsubscribe(&self, symbols: &[String]) -> Vec<Symbol> {
        let released = self.release(CONTROL_SESSION, symbols);
        info!(symbols = ?released, "Control unsubscribe");
        released
    }

    /// Symbols held through the control endpoints.
    #[must_use]
    pub fn control_symbols(&self) -> Vec<Symbol> {
        self.registry.session_symbols(CONTROL_SESSION)
    }

    /// Record a trade and deliver it to every following session.
    ///
    /// Never waits on a session: a full session channel drops that
    /// session's oldest event.
    pub fn publish(&self, trade: Trade) -> PublishOutcome {
        let _fanout = self.fanout.lock();

        if self.last_trades.record(&trade) == RecordOutcome::Stale {
            self.trades_stale.fetch_add(1, Ordering::Relaxed);
            metrics::record_trade_stale();
            warn!(symbol = %trade.symbol, ts = %trade.timestamp, "Out-of-order trade dropped");
            return PublishOutcome::Stale;
        }
        self.trades_published.fetch_add(1, Ordering::Relaxed);

        let targets = self.registry.sessions_for(&trade.symbol);
        if targets.is_empty() {
            return PublishOutcome::Delivered(0);
        }

        let sessions = self.sessions.read();
        let delivered = targets
            .iter()
            .filter_map(|id| sessions.get(id))
            .filter(|sender| sender.send(SessionEvent::Trade(trade.clone())).is_ok())
            .count();

        metrics::record_trades_delivered(delivered as u64);
        PublishOutcome::Delivered(delivered)
    }

    /// Last trade per symbol, seeding placeholders for unseen symbols.
    pub fn last_trades(&self, symbols: &[Symbol]) -> Vec<Trade> {
        self.last_trades.snapshot(symbols)
    }

    /// Symbols always held on the upstream feed.
    #[must_use]
    pub fn master_symbols(&self) -> Vec<Symbol> {
        self.master.clone()
    }

    /// Master list ∪ symbols followed by any session, sorted.
    #[must_use]
    pub fn streamed_symbols(&self) -> Vec<Symbol> {
        let mut symbols = self.master.clone();
        symbols.extend(self.registry.active_symbols());
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Symbols followed by at least one session.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.registry.active_symbols()
    }

    /// Symbols a session follows.
    #[must_use]
    pub fn session_symbols(&self, session: SessionId) -> Vec<Symbol> {
        self.registry.session_symbols(session)
    }

    /// Number of open sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> MultiplexerStats {
        MultiplexerStats {
            sessions: self.session_count(),
            registry: self.registry.stats(),
            cached_symbols: self.last_trades.len(),
            trades_published: self.trades_published.load(Ordering::Relaxed),
            trades_stale: self.trades_stale.load(Ordering::Relaxed),
        }
    }

    fn sender(&self, session: SessionId) -> Result<SessionSender, LiveError> {
        self.sessions
            .read()
            .get(&session)
            .cloned()
            .ok_or(LiveError::UnknownSession(session))
    }

    fn partition(&self, symbols: &[String]) -> SubscribeOutcome {
        let mut outcome = SubscribeOutcome::default();
        for raw in symbols {
            let symbol = raw.trim();
            if self.catalog.is_known(symbol) {
                if !outcome.accepted.iter().any(|s| s == symbol) {
                    outcome.accepted.push(symbol.to_string());
                }
            } else {
                outcome.rejected.push(raw.clone());
            }
        }
        outcome
    }

    fn release(&self, session: SessionId, symbols: &[String]) -> Vec<Symbol> {
        let symbols = normalize(symbols);
        self.registry
            .release_interest_with(session, &symbols, |changes| self.apply_unsubscribe(changes))
            .removed
    }

    fn send_seeds(&self, sender: &SessionSender, symbols: &[Symbol]) {
        for symbol in symbols {
            let seed = self.last_trades.get_or_seed(symbol);
            // Only fails if the session is closing concurrently.
            let _ = sender.send(SessionEvent::Seed(seed));
        }
    }

    fn apply_subscribe(&self, changes: &SubscriptionChanges) {
        if !changes.subscribe.is_empty() {
            let symbols = changes.subscribe_sorted();
            info!(symbols = ?symbols, "Upstream subscribe");
            self.feed.subscribe(&symbols);
        }
    }

    fn apply_unsubscribe(&self, changes: &SubscriptionChanges) {
        if !changes.unsubscribe.is_empty() {
            let symbols = changes.unsubscribe_sorted();
            info!(symbols = ?symbols, "Upstream unsubscribe");
            self.feed.unsubscribe(&symbols);
        }
    }
}

/// Trimmed, non-empty symbols in request order, without repeats.
fn normalize(symbols: &[String]) -> Vec<Symbol> {
    let mut out: Vec<Symbol> = Vec::with_capacity(symbols.len());
    for raw in symbols {
        let symbol = raw.trim();
        if !symbol.is_empty() && !out.iter().any(|s| s == symbol) {
            out.push(symbol.to_string());
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::application::ports::MockFeedControlPort;
    use crate::domain::streaming::Side;

    fn syms(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn quiet_feed() -> Arc<MockFeedControlPort> {
        let mut feed = MockFeedControlPort::new();
        feed.expect_subscribe().returning(|_| ());
        feed.expect_unsubscribe().returning(|_| ());
        Arc::new(feed)
    }

    fn multiplexer(feed: Arc<MockFeedControlPort>, buffer: usize) -> LiveMultiplexer {
        LiveMultiplexer::new(
            Arc::new(SymbolCatalog::default()),
            feed,
            MultiplexerConfig {
                session_buffer: buffer,
            },
        )
    }

    fn trade(symbol: &str, price: rust_decimal::Decimal) -> Trade {
        Trade {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            side: Side::Buy,
            size: 2,
            price,
        }
    }

    #[test]
    fn subscribe_seeds_placeholder_before_first_trade() {
        let mux = multiplexer(quiet_feed(), 16);
        let mut session = mux.open_session();

        mux.subscribe(session.id(), &syms(&["ES.c.0"])).unwrap();

        match session.try_recv() {
            Some(SessionEvent::Seed(seed)) => {
                assert_eq!(seed.symbol, "ES.c.0");
                assert!(seed.is_placeholder());
            }
            other => panic!("expected seed, got {other:?}"),
        }
    }

    #[test]
    fn late_joiner_is_seeded_with_last_trade() {
        let mux = multiplexer(quiet_feed(), 16);
        let first = mux.open_session();
        mux.subscribe(first.id(), &syms(&["ES.c.0"])).unwrap();
        mux.publish(trade("ES.c.0", dec!(5001.25)));

        let mut late = mux.open_session();
        mux.subscribe(late.id(), &syms(&["ES.c.0"])).unwrap();

        let seed = late.try_recv().unwrap();
        assert_eq!(seed, SessionEvent::Seed(mux.last_trades(&syms(&["ES.c.0"]))[0].clone()));
        assert_eq!(seed.trade().price, dec!(5001.25));
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn unknown_symbols_rejected_but_known_ones_apply() {
        let mux = multiplexer(quiet_feed(), 16);
        let session = mux.open_session();

        let outcome = mux.subscribe(session.id(), &syms(&["ES.c.0", "FOO.c.0", "ES"])).unwrap();

        assert_eq!(outcome.accepted, syms(&["ES.c.0"]));
        assert_eq!(outcome.rejected, syms(&["FOO.c.0", "ES"]));
        assert!(matches!(outcome.rejection(), Some(LiveError::UnknownSymbols(s)) if s.len() == 2));
        assert_eq!(mux.session_symbols(session.id()), syms(&["ES.c.0"]));
    }

    #[test]
    fn unknown_session_is_an_error() {
        let mux = multiplexer(quiet_feed(), 16);
        assert_eq!(
            mux.subscribe(7, &syms(&["ES.c.0"])),
            Err(LiveError::UnknownSession(7))
        );
        assert_eq!(mux.unsubscribe(7, &syms(&["ES.c.0"])), Err(LiveError::UnknownSession(7)));
    }

    #[test]
    fn upstream_subscribed_once_for_many_sessions() {
        let mut feed = MockFeedControlPort::new();
        feed.expect_subscribe()
            .withf(|symbols| symbols == ["GC.c.0"])
            .times(1)
            .returning(|_| ());
        feed.expect_unsubscribe()
            .withf(|symbols| symbols == ["GC.c.0"])
            .times(1)
            .returning(|_| ());
        let mux = multiplexer(Arc::new(feed), 16);

        let a = mux.open_session();
        let b = mux.open_session();
        mux.subscribe(a.id(), &syms(&["GC.c.0"])).unwrap();
        mux.subscribe(b.id(), &syms(&["GC.c.0"])).unwrap();
        mux.close_session(a.id());
        mux.unsubscribe(b.id(), &syms(&["GC.c.0"])).unwrap();

        assert!(mux.active_symbols().is_empty());
    }

    #[test]
    fn unsubscribe_trims_like_subscribe() {
        let mut feed = MockFeedControlPort::new();
        feed.expect_subscribe()
            .withf(|symbols| symbols == ["ES.c.0"])
            .times(1)
            .returning(|_| ());
        feed.expect_unsubscribe()
            .withf(|symbols| symbols == ["ES.c.0"])
            .times(1)
            .returning(|_| ());
        let mux = multiplexer(Arc::new(feed), 16);
        let session = mux.open_session();
        mux.subscribe(session.id(), &syms(&[" ES.c.0"])).unwrap();

        let released = mux.unsubscribe(session.id(), &syms(&[" ES.c.0", "ES.c.0 ", ""])).unwrap();

        assert_eq!(released, syms(&["ES.c.0"]));
        assert!(mux.session_symbols(session.id()).is_empty());
        assert!(mux.active_symbols().is_empty());
    }

    #[test]
    fn unsubscribe_returns_only_released_symbols() {
        let mux = multiplexer(quiet_feed(), 16);
        let session = mux.open_session();
        mux.subscribe(session.id(), &syms(&["ES.c.0", "CL.c.0"])).unwrap();

        let released = mux
            .unsubscribe(session.id(), &syms(&["NQ.c.0", "CL.c.0", "FOO.c.0"]))
            .unwrap();

        assert_eq!(released, syms(&["CL.c.0"]));
        assert!(mux.unsubscribe(session.id(), &syms(&["CL.c.0"])).unwrap().is_empty());
        assert_eq!(mux.session_symbols(session.id()), syms(&["ES.c.0"]));
    }

    #[test]
    fn control_interest_shares_refcounts_with_sessions() {
        let mut feed = MockFeedControlPort::new();
        feed.expect_subscribe()
            .withf(|symbols| symbols == ["GC.c.0"])
            .times(1)
            .returning(|_| ());
        feed.expect_unsubscribe()
            .withf(|symbols| symbols == ["GC.c.0"])
            .times(1)
            .returning(|_| ());
        let mux = multiplexer(Arc::new(feed), 16);

        let outcome = mux.control_subscribe(&syms(&["GC.c.0", "ZZZ.c.0"]));
        assert_eq!(outcome.accepted, syms(&["GC.c.0"]));
        assert_eq!(outcome.rejected, syms(&["ZZZ.c.0"]));

        let mut session = mux.open_session();
        mux.subscribe(session.id(), &syms(&["GC.c.0"])).unwrap();
        session.try_recv();

        // The control holder is not a session and receives nothing.
        assert_eq!(mux.publish(trade("GC.c.0", dec!(2300))), PublishOutcome::Delivered(1));
        assert_eq!(mux.session_count(), 1);

        assert_eq!(mux.control_unsubscribe(&syms(&["GC.c.0"])), syms(&["GC.c.0"]));
        assert!(mux.control_unsubscribe(&syms(&["GC.c.0"])).is_empty());
        assert_eq!(mux.active_symbols(), syms(&["GC.c.0"]));

        mux.close_session(session.id());
        assert!(mux.active_symbols().is_empty());
        assert!(mux.control_symbols().is_empty());
    }

    #[test]
    fn trade_reaches_only_following_sessions() {
        let mux = multiplexer(quiet_feed(), 16);
        let mut es = mux.open_session();
        let mut cl = mux.open_session();
        mux.subscribe(es.id(), &syms(&["ES.c.0"])).unwrap();
        mux.subscribe(cl.id(), &syms(&["CL.c.0"])).unwrap();
        es.try_recv();
        cl.try_recv();

        let outcome = mux.publish(trade("ES.c.0", dec!(5000)));

        assert_eq!(outcome, PublishOutcome::Delivered(1));
        assert!(matches!(es.try_recv(), Some(SessionEvent::Trade(t)) if t.price == dec!(5000)));
        assert!(cl.try_recv().is_none());
    }

    #[test]
    fn trade_for_unfollowed_symbol_still_updates_cache() {
        let mux = multiplexer(quiet_feed(), 16);

        assert_eq!(mux.publish(trade("NQ.c.0", dec!(18000))), PublishOutcome::Delivered(0));

        assert_eq!(mux.last_trades(&syms(&["NQ.c.0"]))[0].price, dec!(18000));
    }

    #[test]
    fn stale_trade_is_discarded() {
        let mux = multiplexer(quiet_feed(), 16);
        let mut session = mux.open_session();
        mux.subscribe(session.id(), &syms(&["ES.c.0"])).unwrap();
        session.try_recv();

        let newer = trade("ES.c.0", dec!(2));
        let mut older = trade("ES.c.0", dec!(1));
        older.timestamp = newer.timestamp - Duration::seconds(1);
        mux.publish(newer);

        assert_eq!(mux.publish(older), PublishOutcome::Stale);
        assert_eq!(mux.stats().trades_stale, 1);
        assert!(matches!(session.try_recv(), Some(SessionEvent::Trade(t)) if t.price == dec!(2)));
        assert!(session.try_recv().is_none());
    }

    #[test]
    fn slow_session_drops_without_blocking_others() {
        let mux = multiplexer(quiet_feed(), 4);
        let mut slow = mux.open_session();
        let mut fast = mux.open_session();
        mux.subscribe(slow.id(), &syms(&["ES.c.0"])).unwrap();
        mux.subscribe(fast.id(), &syms(&["ES.c.0"])).unwrap();
        fast.try_recv();

        let start = Utc::now();
        for i in 0..20 {
            let mut t = trade("ES.c.0", rust_decimal::Decimal::from(i));
            t.timestamp = start + Duration::milliseconds(i);
            mux.publish(t);
            assert!(matches!(fast.try_recv(), Some(SessionEvent::Trade(_))));
        }

        let mut received = Vec::new();
        while let Some(event) = slow.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 4);
        assert!(slow.dropped() > 0);
        assert_eq!(received.last().unwrap().trade().price, rust_decimal::Decimal::from(19));
    }

    #[test]
    fn replace_interest_seeds_only_new_symbols() {
        let mut feed = MockFeedControlPort::new();
        feed.expect_subscribe().returning(|_| ());
        feed.expect_unsubscribe()
            .withf(|symbols| symbols == ["ES.c.0"])
            .times(1)
            .returning(|_| ());
        let mux = multiplexer(Arc::new(feed), 16);
        let mut session = mux.open_session();
        mux.subscribe(session.id(), &syms(&["ES.c.0", "NQ.c.0"])).unwrap();
        while session.try_recv().is_some() {}

        mux.replace_interest(session.id(), &syms(&["NQ.c.0", "CL.c.0"])).unwrap();

        let seeded: Vec<String> = std::iter::from_fn(|| session.try_recv())
            .map(|e| e.trade().symbol.clone())
            .collect();
        assert_eq!(seeded, syms(&["CL.c.0"]));
        assert_eq!(mux.session_symbols(session.id()), syms(&["CL.c.0", "NQ.c.0"]));
    }

    #[tokio::test]
    async fn close_session_ends_receiver() {
        let mux = multiplexer(quiet_feed(), 16);
        let mut session = mux.open_session();
        mux.subscribe(session.id(), &syms(&["ES.c.0"])).unwrap();
        session.try_recv();

        mux.close_session(session.id());

        assert!(session.recv().await.is_none());
        assert_eq!(mux.session_count(), 0);
        assert!(mux.active_symbols().is_empty());
    }

    #[test]
    fn master_symbols_are_pre_seeded() {
        let mux = multiplexer(quiet_feed(), 16);
        let masters = mux.master_symbols();
        assert_eq!(mux.stats().cached_symbols, masters.len());
        assert!(mux.last_trades(&masters).iter().all(Trade::is_placeholder));
    }

    #[test]
    fn streamed_symbols_union_master_and_demand() {
        let mux = multiplexer(quiet_feed(), 16).with_master_symbols(syms(&["NQ.c.0", "ES.c.0"]));
        let session = mux.open_session();
        mux.subscribe(session.id(), &syms(&["GC.c.0", "ES.c.0"])).unwrap();

        assert_eq!(mux.master_symbols(), syms(&["ES.c.0", "NQ.c.0"]));
        assert_eq!(mux.streamed_symbols(), syms(&["ES.c.0", "GC.c.0", "NQ.c.0"]));
    }
}
