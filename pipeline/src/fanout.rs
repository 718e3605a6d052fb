//! Fan-out stage behind the sequencer

use common::{StopFlag, TradeRecord};
use logger::{logline, AsyncLogger};
use pool::{Lease, PoolAlloc, PoolCore};
use queue::{enqueue_spin, Queue};
use std::sync::Arc;
use std::thread;

/// One consumer's pool and input queue.
pub struct Branch<P, Q>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
{
    /// Pool the branch's copies are leased from; the consumer releases
    /// them after its terminal step.
    pub pool: Arc<P>,
    /// The consumer's SPSC input queue.
    pub queue: Arc<Q>,
}

/// Copies each sequenced record into every consumer branch, preserving
/// per-consumer ordering and single ownership per copy.
///
/// Both the branch pool and queue are treated as backpressure: the
/// fan-out spins rather than dropping, because its input is already the
/// gap-free stream.
pub struct FanOut<P, Qin, Qout>
where
    P: PoolCore<Item = TradeRecord>,
    Qin: Queue<Lease<P>>,
    Qout: Queue<Lease<P>>,
{
    input: Arc<Qin>,
    branches: Vec<Branch<P, Qout>>,
    logger: Arc<AsyncLogger>,
    stop: StopFlag,
}

impl<P, Qin, Qout> FanOut<P, Qin, Qout>
where
    P: PoolCore<Item = TradeRecord>,
    Qin: Queue<Lease<P>>,
    Qout: Queue<Lease<P>>,
{
    /// Wire the fan-out between the sequencer's output and its branches.
    pub fn new(
        input: Arc<Qin>,
        branches: Vec<Branch<P, Qout>>,
        logger: Arc<AsyncLogger>,
        stop: StopFlag,
    ) -> Self {
        Self {
            input,
            branches,
            logger,
            stop,
        }
    }

    /// Drain the sequencer's output until stopped, then flush what is
    /// left so the consumers see the complete stream.
    pub fn run(&self) {
        logline!(self.logger, "fan-out running with {} branches", self.branches.len());
        while !self.stop.is_stopped() {
            match self.input.dequeue() {
                Some(lease) => self.dispatch(&lease),
                None => thread::yield_now(),
            }
        }
        while let Some(lease) = self.input.dequeue() {
            self.dispatch(&lease);
        }
        logline!(self.logger, "fan-out stopped");
    }

    fn dispatch(&self, record: &TradeRecord) {
        for branch in &self.branches {
            let Some(mut copy) = allocate_spin(&branch.pool, &self.stop) else {
                // Stopping while a consumer is wedged; drop the tail.
                return;
            };
            *copy = *record;
            enqueue_spin(branch.queue.as_ref(), copy);
        }
    }
}

/// Allocate from a branch pool, spinning while the consumer catches up.
fn allocate_spin<P: PoolCore>(pool: &Arc<P>, stop: &StopFlag) -> Option<Lease<P>> {
    loop {
        if let Some(lease) = pool.allocate() {
            return Some(lease);
        }
        if stop.is_stopped() {
            return None;
        }
        thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::messages::TRADE_MESSAGE_TYPE;
    use common::Symbol;
    use pool::TaggedPool;
    use queue::SpscRing;

    type Pool = TaggedPool<TradeRecord>;
    type Ring = SpscRing<Lease<Pool>>;

    fn trade(sequence: u64) -> TradeRecord {
        TradeRecord {
            message_type: TRADE_MESSAGE_TYPE,
            sequence_number: sequence,
            trade_id: sequence,
            timestamp: 1_000,
            price: 10.0,
            quantity: 1.0,
            buyer_is_maker: false,
            best_match: true,
            symbol: Symbol::new("FAN"),
        }
    }

    #[test]
    fn test_every_branch_sees_the_full_stream() {
        let input_pool = Arc::new(Pool::new(64));
        let input: Arc<Ring> = Arc::new(Ring::new(64));
        let branches: Vec<Branch<Pool, Ring>> = (0..3)
            .map(|_| Branch {
                pool: Arc::new(Pool::new(64)),
                queue: Arc::new(Ring::new(64)),
            })
            .collect();
        let taps: Vec<Arc<Ring>> = branches.iter().map(|b| Arc::clone(&b.queue)).collect();
        let logger = Arc::new(AsyncLogger::new(Box::new(std::io::sink()), 64));
        let stop = StopFlag::new();
        let fanout = FanOut::new(Arc::clone(&input), branches, logger, stop.clone());

        for sequence in 0..20 {
            let mut lease = input_pool.allocate().unwrap();
            *lease = trade(sequence);
            input.enqueue(lease).unwrap();
        }
        stop.stop();
        fanout.run();

        for tap in taps {
            let mut sequences = Vec::new();
            while let Some(lease) = tap.dequeue() {
                sequences.push(lease.sequence_number);
            }
            assert_eq!(sequences, (0..20).collect::<Vec<_>>());
        }
        // The inbound leases were all released back to their pool.
        let reclaimed: Vec<_> = (0..64).map(|_| input_pool.allocate().unwrap()).collect();
        assert_eq!(reclaimed.len(), 64);
    }
}
