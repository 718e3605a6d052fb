//! Per-second VWAP aggregation state machine

use crate::publisher::PublishSink;
use common::{StopFlag, Symbol, TradeRecord};
use logger::{logline, AsyncLogger};
use pool::{Lease, PoolCore};
use queue::Queue;
use rustc_hash::FxHashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;

/// Folds each one-second bucket of trades into per-symbol
/// `(sum(price * quantity), sum(quantity))` and publishes
/// `SYMBOL,BUCKET,VWAP` lines on every bucket rollover.
///
/// Invariant: every entry in the running map belongs to `current_bucket`.
/// The first record of a newer bucket publishes and clears the map before
/// being folded in.
pub struct Aggregator<P, Q, S>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
    S: PublishSink,
{
    queue: Arc<Q>,
    sink: S,
    logger: Arc<AsyncLogger>,
    stop: StopFlag,
    current_bucket: Option<u64>,
    sums: FxHashMap<Symbol, (f64, f64)>,
    received: u64,
    published: u64,
    _pool: PhantomData<P>,
}

impl<P, Q, S> Aggregator<P, Q, S>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
    S: PublishSink,
{
    /// Wire the aggregator between its input queue and publish sink.
    pub fn new(queue: Arc<Q>, sink: S, logger: Arc<AsyncLogger>, stop: StopFlag) -> Self {
        Self {
            queue,
            sink,
            logger,
            stop,
            current_bucket: None,
            sums: FxHashMap::default(),
            received: 0,
            published: 0,
            _pool: PhantomData,
        }
    }

    /// Drain the queue until stopped, then publish the final bucket.
    pub fn run(&mut self) {
        logline!(self.logger, "aggregator running");
        while !self.stop.is_stopped() {
            match self.queue.dequeue() {
                Some(lease) => self.fold(&lease),
                None => thread::yield_now(),
            }
        }
        // Drain what the fan-out already handed over, then flush the
        // open bucket so no trade goes unpublished.
        while let Some(lease) = self.queue.dequeue() {
            self.fold(&lease);
        }
        if !self.sums.is_empty() {
            self.rollover();
        }
        logline!(
            self.logger,
            "aggregator stopped: received {} published {}",
            self.received,
            self.published
        );
    }

    /// Fold one trade into the running bucket, rolling over first when
    /// the trade belongs to a newer one.
    pub fn fold(&mut self, record: &TradeRecord) {
        let bucket = record.bucket();
        if self.current_bucket != Some(bucket) {
            if self.current_bucket.is_some() {
                self.rollover();
            }
            self.current_bucket = Some(bucket);
        }
        let entry = self.sums.entry(record.symbol).or_insert((0.0, 0.0));
        entry.0 += record.price * record.quantity;
        entry.1 += record.quantity;
        self.received += 1;
    }

    /// Publication lines for the current bucket, in symbol order so a
    /// repeated rollover of the same state is byte-identical.
    pub fn bucket_lines(&self) -> Vec<String> {
        let Some(bucket) = self.current_bucket else {
            return Vec::new();
        };
        let mut symbols: Vec<Symbol> = self.sums.keys().copied().collect();
        symbols.sort_unstable();
        symbols
            .into_iter()
            .map(|symbol| {
                let (price_volume, volume) = self.sums[&symbol];
                format!("{},{},{:.6}", symbol, bucket, price_volume / volume)
            })
            .collect()
    }

    /// Publish every line of the current bucket and reset the map.
    fn rollover(&mut self) {
        for line in self.bucket_lines() {
            self.sink.publish(&line);
            logline!(self.logger, "sent: {}", line);
            self.published += 1;
        }
        self.sums.clear();
    }

    /// Trades folded so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Lines published so far.
    pub fn published(&self) -> u64 {
        self.published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::messages::TRADE_MESSAGE_TYPE;
    use pool::{PoolAlloc, TaggedPool};
    use queue::SpscRing;

    type Pool = TaggedPool<TradeRecord>;
    type Ring = SpscRing<Lease<Pool>>;

    /// Sink that remembers every published line.
    #[derive(Default)]
    struct CaptureSink(Arc<parking_lot::Mutex<Vec<String>>>);

    impl PublishSink for CaptureSink {
        fn publish(&mut self, line: &str) {
            self.0.lock().push(line.to_string());
        }
    }

    fn trade(symbol: &str, timestamp: u64, price: f64, quantity: f64) -> TradeRecord {
        TradeRecord {
            message_type: TRADE_MESSAGE_TYPE,
            sequence_number: 0,
            trade_id: 0,
            timestamp,
            price,
            quantity,
            buyer_is_maker: false,
            best_match: true,
            symbol: Symbol::new(symbol),
        }
    }

    struct Harness {
        pool: Arc<Pool>,
        queue: Arc<Ring>,
        aggregator: Aggregator<Pool, Ring, CaptureSink>,
        lines: Arc<parking_lot::Mutex<Vec<String>>>,
        stop: StopFlag,
    }

    fn harness() -> Harness {
        let pool = Arc::new(Pool::new(64));
        let queue = Arc::new(Ring::new(64));
        let logger = Arc::new(AsyncLogger::new(Box::new(std::io::sink()), 64));
        let sink = CaptureSink::default();
        let lines = Arc::clone(&sink.0);
        let stop = StopFlag::new();
        let aggregator = Aggregator::new(Arc::clone(&queue), sink, logger, stop.clone());
        Harness {
            pool,
            queue,
            aggregator,
            lines,
            stop,
        }
    }

    #[test]
    fn test_bucket_rollover_publishes_vwap() {
        let mut h = harness();
        h.aggregator.fold(&trade("AAAA", 1_000, 100.0, 10.0));
        h.aggregator.fold(&trade("AAAA", 1_500, 101.0, 20.0));
        assert!(h.lines.lock().is_empty());

        // Crossing into bucket 2 publishes bucket 1.
        h.aggregator.fold(&trade("AAAA", 2_001, 99.0, 5.0));
        assert_eq!(h.lines.lock().as_slice(), ["AAAA,1,100.666667"]);

        // The new bucket only holds the third trade.
        assert_eq!(h.aggregator.bucket_lines(), ["AAAA,2,99.000000"]);
    }

    #[test]
    fn test_rollover_is_idempotent_over_the_same_state() {
        let mut h = harness();
        h.aggregator.fold(&trade("AAAA", 1_000, 100.0, 10.0));
        h.aggregator.fold(&trade("BBBB", 1_200, 50.0, 4.0));
        assert_eq!(h.aggregator.bucket_lines(), h.aggregator.bucket_lines());
    }

    #[test]
    fn test_symbols_publish_in_sorted_order() {
        let mut h = harness();
        h.aggregator.fold(&trade("ZZZZ", 1_000, 10.0, 1.0));
        h.aggregator.fold(&trade("AAAA", 1_100, 20.0, 1.0));
        h.aggregator.fold(&trade("MMMM", 1_200, 30.0, 1.0));
        assert_eq!(
            h.aggregator.bucket_lines(),
            [
                "AAAA,1,20.000000",
                "MMMM,1,30.000000",
                "ZZZZ,1,10.000000"
            ]
        );
    }

    #[test]
    fn test_shutdown_drains_queue_and_publishes_final_bucket() {
        let mut h = harness();
        for (timestamp, price) in [(1_000u64, 100.0), (1_400, 102.0), (2_100, 50.0)] {
            let mut lease = h.pool.allocate().unwrap();
            *lease = trade("ETH", timestamp, price, 1.0);
            h.queue.enqueue(lease).unwrap();
        }
        h.stop.stop();
        h.aggregator.run();

        let lines = h.lines.lock();
        assert_eq!(lines.as_slice(), ["ETH,1,101.000000", "ETH,2,50.000000"]);
        assert_eq!(h.aggregator.received(), 3);
        assert_eq!(h.aggregator.published(), 2);
    }
}
