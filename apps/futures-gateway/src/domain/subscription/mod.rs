//! Subscription Registry
//!
//! Tracks which client sessions follow which symbols and decides when the
//! single upstream connection must subscribe or unsubscribe.
//!
//! # Design
//!
//! The registry tracks:
//! - Which symbols each session follows
//! - The set of sessions behind every followed symbol
//! - Whether the upstream subscription for a symbol is live
//!
//! Many sessions may follow the same symbol while the upstream holds a
//! single subscription. Only a 0→1 transition subscribes and only a 1→0
//! transition unsubscribes.
//!
//! Each `*_with` operation runs its upstream hook while the registry lock
//! is held, so hook invocations for concurrent updates are observed in the
//! same order as the registry transitions that caused them.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use super::streaming::Symbol;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a client session.
pub type SessionId = u64;

/// A followed symbol and the sessions behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Symbol being followed.
    pub symbol: Symbol,
    /// Sessions following the symbol. Never empty while the entry exists.
    pub sessions: HashSet<SessionId>,
    /// True once the upstream subscribe for this symbol has been issued.
    pub upstream_subscribed: bool,
}

impl Subscription {
    fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            sessions: HashSet::new(),
            upstream_subscribed: false,
        }
    }

    /// Number of sessions following the symbol.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.sessions.len()
    }
}

// =============================================================================
// Subscription Changes
// =============================================================================

/// Changes to upstream subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Symbols to subscribe to.
    pub subscribe: HashSet<Symbol>,
    /// Symbols to unsubscribe from.
    pub unsubscribe: HashSet<Symbol>,
}

impl SubscriptionChanges {
    /// Check if there are any changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribe.is_empty() && self.unsubscribe.is_empty()
    }

    /// Create changes with only subscribes.
    #[must_use]
    pub fn subscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: symbols.into_iter().collect(),
            unsubscribe: HashSet::new(),
        }
    }

    /// Create changes with only unsubscribes.
    #[must_use]
    pub fn unsubscribe_only(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            subscribe: HashSet::new(),
            unsubscribe: symbols.into_iter().collect(),
        }
    }

    /// Symbols to subscribe, sorted.
    #[must_use]
    pub fn subscribe_sorted(&self) -> Vec<Symbol> {
        sorted(&self.subscribe)
    }

    /// Symbols to unsubscribe, sorted.
    #[must_use]
    pub fn unsubscribe_sorted(&self) -> Vec<Symbol> {
        sorted(&self.unsubscribe)
    }
}

fn sorted(set: &HashSet<Symbol>) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = set.iter().cloned().collect();
    symbols.sort_unstable();
    symbols
}

/// Outcome of replacing a session's interest set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestUpdate {
    /// Symbols the session newly follows.
    pub added: Vec<Symbol>,
    /// Symbols the session stopped following.
    pub removed: Vec<Symbol>,
    /// Resulting upstream changes.
    pub upstream: SubscriptionChanges,
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    /// Map from session ID to followed symbols.
    session_symbols: HashMap<SessionId, HashSet<Symbol>>,
    /// Map from symbol to its subscription entry.
    subscriptions: HashMap<Symbol, Subscription>,
}

impl RegistryState {
    /// Returns symbols whose session count went 0→1.
    fn add(&mut self, session: SessionId, symbols: &[Symbol]) -> Vec<Symbol> {
        let session_set = self.session_symbols.entry(session).or_default();
        let mut new_upstream = Vec::new();

        for symbol in symbols {
            if !session_set.insert(symbol.clone()) {
                continue;
            }

            let entry = self
                .subscriptions
                .entry(symbol.clone())
                .or_insert_with(|| Subscription::new(symbol.clone()));
            entry.sessions.insert(session);

            if entry.ref_count() == 1 {
                new_upstream.push(symbol.clone());
            }
        }

        if session_set.is_empty() {
            self.session_symbols.remove(&session);
        }

        new_upstream
    }

    /// Returns the symbols the session actually held, then those whose
    /// session count went 1→0.
    fn remove(&mut self, session: SessionId, symbols: &[Symbol]) -> (Vec<Symbol>, Vec<Symbol>) {
        let Some(session_set) = self.session_symbols.get_mut(&session) else {
            return (vec![], vec![]);
        };

        let mut removed = Vec::new();
        for symbol in symbols {
            if session_set.remove(symbol) {
                removed.push(symbol.clone());
            }
        }

        if session_set.is_empty() {
            self.session_symbols.remove(&session);
        }

        let upstream = self.release(session, &removed);
        (removed, upstream)
    }

    fn remove_session(&mut self, session: SessionId) -> Vec<Symbol> {
        let Some(session_set) = self.session_symbols.remove(&session) else {
            return vec![];
        };
        let symbols: Vec<Symbol> = session_set.into_iter().collect();
        self.release(session, &symbols)
    }

    fn release(&mut self, session: SessionId, symbols: &[Symbol]) -> Vec<Symbol> {
        let mut remove_upstream = Vec::new();
        for symbol in symbols {
            let Some(entry) = self.subscriptions.get_mut(symbol) else {
                continue;
            };
            entry.sessions.remove(&session);
            if entry.sessions.is_empty() {
                self.subscriptions.remove(symbol);
                remove_upstream.push(symbol.clone());
            }
        }
        remove_upstream
    }

    fn mark_upstream(&mut self, symbols: &HashSet<Symbol>) {
        for symbol in symbols {
            if let Some(entry) = self.subscriptions.get_mut(symbol) {
                entry.upstream_subscribed = true;
            }
        }
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Reference-counted mapping from symbols to interested sessions.
///
/// # Example
///
/// ```rust
/// use futures_gateway::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
///
/// // Session 1 follows ES - upstream must subscribe
/// let changes = registry.add_interest(1, &["ES.c.0".to_string()]);
/// assert!(changes.subscribe.contains("ES.c.0"));
///
/// // Session 2 follows ES too - nothing to do upstream
/// let changes = registry.add_interest(2, &["ES.c.0".to_string()]);
/// assert!(changes.is_empty());
///
/// // Session 1 leaves - still followed by session 2
/// let changes = registry.session_closed(1);
/// assert!(changes.unsubscribe.is_empty());
///
/// // Session 2 drops ES - upstream must unsubscribe
/// let changes = registry.remove_interest(2, &["ES.c.0".to_string()]);
/// assert!(changes.unsubscribe.contains("ES.c.0"));
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add symbols to a session's interest set.
    pub fn add_interest(&self, session: SessionId, symbols: &[Symbol]) -> SubscriptionChanges {
        self.add_interest_with(session, symbols, |_| {})
    }

    /// Add symbols to a session's interest set, running `apply` on any
    /// upstream changes before the registry lock is released.
    pub fn add_interest_with(
        &self,
        session: SessionId,
        symbols: &[Symbol],
        apply: impl FnOnce(&SubscriptionChanges),
    ) -> SubscriptionChanges {
        let mut state = self.state.write();
        let changes = SubscriptionChanges::subscribe_only(state.add(session, symbols));
        if !changes.is_empty() {
            apply(&changes);
            state.mark_upstream(&changes.subscribe);
        }
        changes
    }

    /// Remove symbols from a session's interest set.
    pub fn remove_interest(&self, session: SessionId, symbols: &[Symbol]) -> SubscriptionChanges {
        self.remove_interest_with(session, symbols, |_| {})
    }

    /// Remove symbols from a session's interest set, running `apply` on any
    /// upstream changes before the registry lock is released.
    pub fn remove_interest_with(
        &self,
        session: SessionId,
        symbols: &[Symbol],
        apply: impl FnOnce(&SubscriptionChanges),
    ) -> SubscriptionChanges {
        self.release_interest_with(session, symbols, apply).upstream
    }

    /// Like [`remove_interest_with`](Self::remove_interest_with), but also
    /// reports which of the requested symbols the session was following.
    ///
    /// `added` is always empty.
    pub fn release_interest_with(
        &self,
        session: SessionId,
        symbols: &[Symbol],
        apply: impl FnOnce(&SubscriptionChanges),
    ) -> InterestUpdate {
        let mut state = self.state.write();
        let (removed, released) = state.remove(session, symbols);
        let upstream = SubscriptionChanges::unsubscribe_only(released);
        if !upstream.is_empty() {
            apply(&upstream);
        }
        InterestUpdate {
            added: Vec::new(),
            removed,
            upstream,
        }
    }

    /// Replace a session's whole interest set.
    pub fn replace_interest(&self, session: SessionId, symbols: &[Symbol]) -> InterestUpdate {
        self.replace_interest_with(session, symbols, |_| {})
    }

    /// Replace a session's whole interest set, running `apply` on the net
    /// upstream changes before the registry lock is released.
    ///
    /// A symbol present in both the old and new set keeps its upstream
    /// subscription untouched.
    pub fn replace_interest_with(
        &self,
        session: SessionId,
        symbols: &[Symbol],
        apply: impl FnOnce(&SubscriptionChanges),
    ) -> InterestUpdate {
        let mut state = self.state.write();

        let wanted: HashSet<&Symbol> = symbols.iter().collect();
        let current = state.session_symbols.get(&session).cloned().unwrap_or_default();

        let mut removed: Vec<Symbol> = current
            .iter()
            .filter(|s| !wanted.contains(s))
            .cloned()
            .collect();
        let mut added: Vec<Symbol> = Vec::new();
        for symbol in symbols {
            if !current.contains(symbol) && !added.contains(symbol) {
                added.push(symbol.clone());
            }
        }
        removed.sort_unstable();

        let upstream = SubscriptionChanges {
            unsubscribe: state.remove(session, &removed).1.into_iter().collect(),
            subscribe: state.add(session, &added).into_iter().collect(),
        };
        if !upstream.is_empty() {
            apply(&upstream);
            state.mark_upstream(&upstream.subscribe);
        }

        InterestUpdate {
            added,
            removed,
            upstream,
        }
    }

    /// Drop every interest held by a session.
    pub fn session_closed(&self, session: SessionId) -> SubscriptionChanges {
        self.session_closed_with(session, |_| {})
    }

    /// Drop every interest held by a session, running `apply` on any
    /// upstream changes before the registry lock is released.
    pub fn session_closed_with(
        &self,
        session: SessionId,
        apply: impl FnOnce(&SubscriptionChanges),
    ) -> SubscriptionChanges {
        let mut state = self.state.write();
        let changes = SubscriptionChanges::unsubscribe_only(state.remove_session(session));
        if !changes.is_empty() {
            apply(&changes);
        }
        changes
    }

    /// Sessions following a symbol.
    #[must_use]
    pub fn sessions_for(&self, symbol: &str) -> Vec<SessionId> {
        self.state
            .read()
            .subscriptions
            .get(symbol)
            .map(|entry| entry.sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Symbols a session follows, sorted.
    #[must_use]
    pub fn session_symbols(&self, session: SessionId) -> Vec<Symbol> {
        self.state
            .read()
            .session_symbols
            .get(&session)
            .map(sorted)
            .unwrap_or_default()
    }

    /// Every symbol with at least one session, sorted.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        let state = self.state.read();
        let mut symbols: Vec<Symbol> = state.subscriptions.keys().cloned().collect();
        symbols.sort_unstable();
        symbols
    }

    /// Subscription entry for a symbol.
    #[must_use]
    pub fn subscription(&self, symbol: &str) -> Option<Subscription> {
        self.state.read().subscriptions.get(symbol).cloned()
    }

    /// Registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            symbol_count: state.subscriptions.len(),
            session_count: state.session_symbols.len(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of followed symbols.
    pub symbol_count: usize,
    /// Number of sessions following at least one symbol.
    pub session_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
