//! Master Trade Stream
//!
//! Every accepted upstream trade, regardless of session interest, for
//! monitoring readers. Backed by a bounded broadcast channel: publishing
//! never waits, and a reader that falls behind skips the oldest trades.

use tokio::sync::broadcast;

use crate::domain::streaming::Trade;

/// Broadcast of every upstream trade.
#[derive(Debug)]
pub struct MasterStream {
    sender: broadcast::Sender<Trade>,
}

impl MasterStream {
    /// Create a stream that buffers up to `capacity` trades per reader.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Hand a trade to every reader. Returns the number of readers.
    pub fn publish(&self, trade: &Trade) -> usize {
        // Err only means nobody is listening.
        self.sender.send(trade.clone()).unwrap_or(0)
    }

    /// Start reading from the next published trade.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Trade> {
        self.sender.subscribe()
    }

    /// Connected readers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::domain::streaming::Side;

    fn trade(symbol: &str, n: i64) -> Trade {
        Trade {
            symbol: symbol.to_string(),
            timestamp: Utc::now() + Duration::milliseconds(n),
            side: Side::Sell,
            size: 1,
            price: Decimal::from(n),
        }
    }

    #[test]
    fn publish_without_readers_is_a_noop() {
        let stream = MasterStream::new(4);
        assert_eq!(stream.publish(&trade("ES.c.0", 1)), 0);
        assert_eq!(stream.receiver_count(), 0);
    }

    #[test]
    fn every_reader_sees_every_symbol() {
        let stream = MasterStream::new(4);
        let mut a = stream.subscribe();
        let mut b = stream.subscribe();

        assert_eq!(stream.publish(&trade("ES.c.0", 1)), 2);
        stream.publish(&trade("CL.c.0", 2));

        for rx in [&mut a, &mut b] {
            assert_eq!(rx.try_recv().unwrap().symbol, "ES.c.0");
            assert_eq!(rx.try_recv().unwrap().symbol, "CL.c.0");
        }
    }

    #[test]
    fn slow_reader_lags_instead_of_blocking() {
        let stream = MasterStream::new(2);
        let mut slow = stream.subscribe();

        for n in 0..5 {
            stream.publish(&trade("ES.c.0", n));
        }

        assert!(matches!(slow.try_recv(), Err(TryRecvError::Lagged(3))));
        assert_eq!(slow.try_recv().unwrap().price, Decimal::from(3));
        assert_eq!(slow.try_recv().unwrap().price, Decimal::from(4));
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Empty)));
    }
}
