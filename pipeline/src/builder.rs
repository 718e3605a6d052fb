//! Order book builder consuming the sequenced stream

use book::{Order, OrderBook};
use common::{Result, StopFlag, TradeRecord};
use logger::{logline, AsyncLogger};
use parking_lot::Mutex;
use pool::{Lease, PoolCore};
use queue::Queue;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;

/// Scale factor turning fractional base-asset quantities into the book's
/// integer units (milli-units).
const QTY_SCALE: f64 = 1000.0;

/// Derives one resting order per trade and feeds the book: the trade id
/// becomes the order id, and the passive side of the print decides the
/// side (buyer-is-maker prints rest on the bid).
pub struct BookBuilder<P, Q>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
{
    queue: Arc<Q>,
    book: Arc<Mutex<OrderBook>>,
    logger: Arc<AsyncLogger>,
    stop: StopFlag,
    _pool: PhantomData<P>,
}

impl<P, Q> BookBuilder<P, Q>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
{
    /// Wire the builder between its queue and a shared book.
    pub fn new(
        queue: Arc<Q>,
        book: Arc<Mutex<OrderBook>>,
        logger: Arc<AsyncLogger>,
        stop: StopFlag,
    ) -> Self {
        Self {
            queue,
            book,
            logger,
            stop,
            _pool: PhantomData,
        }
    }

    /// Drain the queue until stopped, then flush the remainder.
    pub fn run(&self) -> Result<()> {
        logline!(self.logger, "book builder running");
        while !self.stop.is_stopped() {
            match self.queue.dequeue() {
                Some(lease) => self.apply(&lease)?,
                None => thread::yield_now(),
            }
        }
        while let Some(lease) = self.queue.dequeue() {
            self.apply(&lease)?;
        }
        logline!(self.logger, "book builder stopped");
        Ok(())
    }

    fn apply(&self, record: &TradeRecord) -> Result<()> {
        let quantity = (record.quantity * QTY_SCALE).round() as i32;
        if quantity <= 0 {
            return Ok(());
        }
        let order = Order {
            order_id: record.trade_id,
            price: record.price,
            quantity,
            is_buy: record.buyer_is_maker,
        };
        match self.book.lock().insert(order) {
            Ok(()) => Ok(()),
            Err(e @ common::Error::ResourceExhausted(_)) => Err(e),
            Err(e) => {
                // Off-grid price or replayed trade id: log and move on.
                logline!(
                    self.logger,
                    "book skipped trade {}: {}",
                    record.trade_id,
                    e
                );
                Ok(())
            }
        }
    }
}
