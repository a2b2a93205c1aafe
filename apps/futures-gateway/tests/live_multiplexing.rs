//! Live Multiplexing Integration Tests
//!
//! Tests seeding, upstream reference counting, slow-session isolation, and
//! the client WebSocket end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use futures_gateway::infrastructure::http::router;
use futures_gateway::{
    AppState, BarCache, DailyBar, DateRange, FeedControlPort, FeedState, HistoricalSourceError,
    HistoricalSourcePort, HistoryService, LiveMultiplexer, MasterStream, MultiplexerConfig,
    PublishOutcome, SessionEvent, Side, Symbol, SymbolCatalog, Trade,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum FeedCall {
    Subscribe(Vec<Symbol>),
    Unsubscribe(Vec<Symbol>),
}

/// Records upstream control calls in order.
#[derive(Default)]
struct RecordingFeed {
    calls: Mutex<Vec<FeedCall>>,
}

impl RecordingFeed {
    fn calls(&self) -> Vec<FeedCall> {
        self.calls.lock().clone()
    }
}

impl FeedControlPort for RecordingFeed {
    fn subscribe(&self, symbols: &[Symbol]) {
        self.calls.lock().push(FeedCall::Subscribe(symbols.to_vec()));
    }

    fn unsubscribe(&self, symbols: &[Symbol]) {
        self.calls.lock().push(FeedCall::Unsubscribe(symbols.to_vec()));
    }
}

struct NoHistory;

#[async_trait]
impl HistoricalSourcePort for NoHistory {
    async fn fetch_daily_bars(
        &self,
        _symbol: &str,
        _range: DateRange,
    ) -> Result<Vec<DailyBar>, HistoricalSourceError> {
        Ok(Vec::new())
    }
}

fn setup(session_buffer: usize) -> (Arc<LiveMultiplexer>, Arc<RecordingFeed>) {
    let feed = Arc::new(RecordingFeed::default());
    let multiplexer = Arc::new(LiveMultiplexer::new(
        Arc::new(SymbolCatalog::default()),
        Arc::clone(&feed) as Arc<dyn FeedControlPort>,
        MultiplexerConfig { session_buffer },
    ));
    (multiplexer, feed)
}

fn syms(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

fn make_trade(symbol: &str, secs: i64, price: i64) -> Trade {
    Trade {
        symbol: symbol.to_string(),
        timestamp: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
        side: Side::Sell,
        size: 2,
        price: Decimal::new(price, 2),
    }
}

/// Next text frame as JSON.
async fn next_json<S>(ws: &mut S) -> serde_json::Value
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[test]
fn never_traded_symbol_seeds_placeholder() {
    let (multiplexer, _) = setup(16);
    let mut session = multiplexer.open_session();

    multiplexer.subscribe(session.id(), &syms(&["GC.c.0"])).unwrap();

    let SessionEvent::Seed(seed) = session.try_recv().unwrap() else {
        panic!("expected seed");
    };
    assert_eq!(seed.symbol, "GC.c.0");
    assert_eq!(seed.size, 0);
    assert_eq!(seed.price, Decimal::ZERO);
    assert!(session.try_recv().is_none());
}

#[test]
fn late_joiner_gets_latest_value_only() {
    let (multiplexer, _) = setup(16);
    let first = multiplexer.open_session();
    multiplexer.subscribe(first.id(), &syms(&["ES.c.0"])).unwrap();

    multiplexer.publish(make_trade("ES.c.0", 100, 500_000));
    multiplexer.publish(make_trade("ES.c.0", 101, 500_025));

    let mut late = multiplexer.open_session();
    multiplexer.subscribe(late.id(), &syms(&["ES.c.0"])).unwrap();

    let SessionEvent::Seed(seed) = late.try_recv().unwrap() else {
        panic!("expected seed");
    };
    assert_eq!(seed.price, Decimal::new(500_025, 2));
    assert!(late.try_recv().is_none());
}

#[test]
fn upstream_calls_follow_zero_crossings_only() {
    let (multiplexer, feed) = setup(16);
    let a = multiplexer.open_session();
    let b = multiplexer.open_session();
    let c = multiplexer.open_session();

    for session in [&a, &b, &c] {
        multiplexer.subscribe(session.id(), &syms(&["ES.c.0"])).unwrap();
    }
    multiplexer.unsubscribe(a.id(), &syms(&["ES.c.0"])).unwrap();
    multiplexer.close_session(b.id());
    assert_eq!(feed.calls(), vec![FeedCall::Subscribe(syms(&["ES.c.0"]))]);

    multiplexer.close_session(c.id());
    assert_eq!(
        feed.calls(),
        vec![
            FeedCall::Subscribe(syms(&["ES.c.0"])),
            FeedCall::Unsubscribe(syms(&["ES.c.0"])),
        ]
    );
    assert!(multiplexer.active_symbols().is_empty());
}

#[test]
fn concurrent_interest_changes_alternate_upstream() {
    let (multiplexer, feed) = setup(16);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let multiplexer = Arc::clone(&multiplexer);
            std::thread::spawn(move || {
                let session = multiplexer.open_session();
                for _ in 0..200 {
                    multiplexer.subscribe(session.id(), &syms(&["CL.c.0"])).unwrap();
                    multiplexer.unsubscribe(session.id(), &syms(&["CL.c.0"])).unwrap();
                }
                multiplexer.close_session(session.id());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let calls = feed.calls();
    assert!(!calls.is_empty());
    for (i, call) in calls.iter().enumerate() {
        let expected = if i % 2 == 0 {
            FeedCall::Subscribe(syms(&["CL.c.0"]))
        } else {
            FeedCall::Unsubscribe(syms(&["CL.c.0"]))
        };
        assert_eq!(call, &expected, "call {i} out of order");
    }
    assert_eq!(calls.len() % 2, 0);
}

#[test]
fn slow_session_does_not_hold_back_others() {
    let (multiplexer, _) = setup(4);
    let mut stalled = multiplexer.open_session();
    let mut draining = multiplexer.open_session();
    multiplexer.subscribe(stalled.id(), &syms(&["NQ.c.0"])).unwrap();
    multiplexer.subscribe(draining.id(), &syms(&["NQ.c.0"])).unwrap();
    draining.try_recv().unwrap();

    let mut received = 0;
    for i in 0..100 {
        let outcome = multiplexer.publish(make_trade("NQ.c.0", 1_000 + i, 1_800_000 + i));
        assert_eq!(outcome, PublishOutcome::Delivered(2));
        while let Some(SessionEvent::Trade(_)) = draining.try_recv() {
            received += 1;
        }
    }
    assert_eq!(received, 100);
    assert_eq!(draining.dropped(), 0);

    // The stalled session keeps only its newest events.
    let mut last = None;
    while let Some(event) = stalled.try_recv() {
        last = Some(event.trade().clone());
    }
    assert!(stalled.dropped() > 0);
    assert_eq!(last.unwrap().timestamp.timestamp(), 1_099);
}

#[test]
fn out_of_order_trade_is_discarded() {
    let (multiplexer, _) = setup(16);
    let mut session = multiplexer.open_session();
    multiplexer.subscribe(session.id(), &syms(&["ES.c.0"])).unwrap();
    session.try_recv().unwrap();

    multiplexer.publish(make_trade("ES.c.0", 200, 500_000));
    assert_eq!(
        multiplexer.publish(make_trade("ES.c.0", 199, 499_900)),
        PublishOutcome::Stale
    );

    assert!(matches!(session.try_recv(), Some(SessionEvent::Trade(t)) if t.timestamp.timestamp() == 200));
    assert!(session.try_recv().is_none());
    assert_eq!(
        multiplexer.last_trades(&syms(&["ES.c.0"]))[0].price,
        Decimal::new(500_000, 2)
    );
}

#[tokio::test]
async fn websocket_client_receives_ack_seed_and_trades() {
    let (multiplexer, feed) = setup(16);
    let catalog = Arc::new(SymbolCatalog::default());
    let state = AppState {
        multiplexer: Arc::clone(&multiplexer),
        history: Arc::new(HistoryService::new(
            catalog,
            Arc::new(NoHistory),
            Arc::new(BarCache::new(4)),
        )),
        feed_state: Arc::new(FeedState::new()),
        master_stream: Arc::new(MasterStream::new(16)),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/live/ws"))
        .await
        .unwrap();

    ws.send(Message::Text(
        r#"{"action":"subscribe","symbols":["ES.c.0","BAD"]}"#.into(),
    ))
    .await
    .unwrap();

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "subscribed");
    assert_eq!(ack["symbols"], serde_json::json!(["ES.c.0"]));

    let err = next_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "unknown_symbols");

    let seed = next_json(&mut ws).await;
    assert_eq!(seed["type"], "seed");
    assert_eq!(seed["symbol"], "ES.c.0");
    assert_eq!(seed["size"], 0);

    multiplexer.publish(make_trade("ES.c.0", 1_700_000_000, 512_550));
    let trade = next_json(&mut ws).await;
    assert_eq!(trade["type"], "trade");
    assert_eq!(trade["price"], 5125.5);
    assert_eq!(trade["side"], "sell");
    assert_eq!(trade["name"], "E-mini S&P 500");

    ws.close(None).await.unwrap();
    timeout(Duration::from_secs(2), async {
        while multiplexer.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(feed.calls().last(), Some(&FeedCall::Unsubscribe(syms(&["ES.c.0"]))));

    server.abort();
}
