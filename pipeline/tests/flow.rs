//! In-process pipeline flow: sequencer -> fan-out -> consumers
//!
//! Ten thousand trades, some lost on the way in, must come out the far
//! end as a dense stream: the book holds every trade exactly once and
//! the aggregator published every bucket.

use agg::{Aggregator, PublishSink};
use book::OrderBook;
use common::messages::TRADE_MESSAGE_TYPE;
use common::{StopFlag, Symbol, TradeRecord};
use feed::{MemoryRecovery, Sequencer};
use logger::AsyncLogger;
use parking_lot::Mutex;
use pipeline::{BookBuilder, Branch, FanOut};
use pool::{Lease, PoolAlloc, TaggedPool};
use queue::{enqueue_spin, SpscRing};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Pool = TaggedPool<TradeRecord>;
type Ring = SpscRing<Lease<Pool>>;

const TOTAL: u64 = 10_000;

fn trade(sequence: u64) -> TradeRecord {
    TradeRecord {
        message_type: TRADE_MESSAGE_TYPE,
        sequence_number: sequence,
        trade_id: sequence,
        // One-second buckets of a thousand trades each.
        timestamp: 1_000 + sequence,
        price: 100.0 + (sequence % 50) as f64 * 0.01,
        quantity: 1.0,
        buyer_is_maker: sequence % 2 == 0,
        best_match: true,
        symbol: Symbol::new("EEEE"),
    }
}

#[derive(Clone, Default)]
struct CaptureSink(Arc<Mutex<Vec<String>>>);

impl PublishSink for CaptureSink {
    fn publish(&mut self, line: &str) {
        self.0.lock().push(line.to_string());
    }
}

#[test]
fn dense_stream_reaches_every_consumer() {
    let logger = Arc::new(AsyncLogger::new(Box::new(std::io::sink()), 256));
    let stop = StopFlag::new();

    let pool = Arc::new(Pool::new(4096));
    let recv_queue: Arc<Ring> = Arc::new(Ring::new(1024));
    let send_queue: Arc<Ring> = Arc::new(Ring::new(1024));

    let store: Vec<TradeRecord> = (0..TOTAL).map(trade).collect();
    let mut sequencer = Sequencer::new(
        Arc::clone(&recv_queue),
        Arc::clone(&send_queue),
        Arc::clone(&pool),
        MemoryRecovery::new(store),
        Arc::clone(&logger),
        stop.clone(),
        0,
        false,
    );

    let book = Arc::new(Mutex::new(OrderBook::new(1 << 12, 16_384)));
    let book_branch = Branch {
        pool: Arc::new(Pool::new(4096)),
        queue: Arc::new(Ring::new(1024)),
    };
    let agg_branch = Branch {
        pool: Arc::new(Pool::new(4096)),
        queue: Arc::new(Ring::new(1024)),
    };
    let builder = BookBuilder::new(
        Arc::clone(&book_branch.queue),
        Arc::clone(&book),
        Arc::clone(&logger),
        stop.clone(),
    );
    let capture = CaptureSink::default();
    let lines = capture.clone();
    let mut aggregator = Aggregator::new(
        Arc::clone(&agg_branch.queue),
        capture,
        Arc::clone(&logger),
        stop.clone(),
    );
    let fanout = FanOut::new(
        Arc::clone(&send_queue),
        vec![book_branch, agg_branch],
        Arc::clone(&logger),
        stop.clone(),
    );

    let mut workers = vec![
        thread::spawn(move || {
            sequencer.run().unwrap();
        }),
        thread::spawn(move || fanout.run()),
        thread::spawn(move || builder.run().unwrap()),
        thread::spawn(move || aggregator.run()),
    ];

    // Lose a slice of the stream on the way in; the sequencer repairs it
    // from the recovery store.
    for sequence in (0..TOTAL).filter(|&s| !(4_000..4_250).contains(&s)) {
        let mut lease = pool.allocate().expect("input pool slot");
        *lease = trade(sequence);
        enqueue_spin(recv_queue.as_ref(), lease);
    }

    let deadline = Instant::now() + Duration::from_secs(20);
    while book.lock().order_count() < TOTAL as usize {
        assert!(Instant::now() < deadline, "pipeline stalled");
        thread::sleep(Duration::from_millis(10));
    }

    stop.stop();
    for worker in workers.drain(..) {
        worker.join().expect("worker panicked");
    }

    // Book: every trade exactly once, best levels consistent with the
    // reduction over the inputs.
    let book = book.lock();
    assert_eq!(book.order_count(), TOTAL as usize);
    // Buy orders come from buyer-is-maker (even) sequences, whose
    // highest price residue is 48 ticks.
    let (best_bid_price, _) = book.best_bid().expect("bid side populated");
    assert!((best_bid_price - 100.48).abs() < 1e-9);

    // Aggregator: trades span buckets 1..=10, every bucket published
    // exactly once (the last on shutdown), in bucket order.
    let lines = lines.0.lock();
    assert_eq!(lines.len(), 10);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.starts_with("EEEE,"), "unexpected line {line}");
        let bucket: u64 = line.split(',').nth(1).unwrap().parse().unwrap();
        assert_eq!(bucket, i as u64 + 1);
    }
}
