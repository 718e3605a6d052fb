//! Gap-detecting sequencer

use crate::recovery::RecoverySource;
use common::{Error, Result, StopFlag, TradeRecord};
use logger::{logline, AsyncLogger};
use pool::{Lease, PoolAlloc, PoolCore};
use queue::{enqueue_spin, Queue};
use std::sync::Arc;
use std::thread;

/// Enforces contiguous sequence numbers between the receiver's queue and
/// the fan-out queue.
///
/// In-order records pass straight through. A record from the future
/// triggers a synchronous repair of `[next, seq - 1]` through the
/// recovery source before the triggering record is forwarded, so the
/// output queue only ever sees a dense ascending stream. Stale records
/// release their lease and vanish.
pub struct Sequencer<P, Qin, Qout, R>
where
    P: PoolCore<Item = TradeRecord>,
    Qin: Queue<Lease<P>>,
    Qout: Queue<Lease<P>>,
    R: RecoverySource,
{
    recv_queue: Arc<Qin>,
    send_queue: Arc<Qout>,
    pool: Arc<P>,
    recovery: R,
    logger: Arc<AsyncLogger>,
    stop: StopFlag,
    next_sequence: u64,
    debug: bool,
}

impl<P, Qin, Qout, R> Sequencer<P, Qin, Qout, R>
where
    P: PoolCore<Item = TradeRecord>,
    Qin: Queue<Lease<P>>,
    Qout: Queue<Lease<P>>,
    R: RecoverySource,
{
    /// Wire the sequencer between its queues. The recovery source is
    /// handed in at construction; the callback back into the output
    /// queue stays internal.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recv_queue: Arc<Qin>,
        send_queue: Arc<Qout>,
        pool: Arc<P>,
        recovery: R,
        logger: Arc<AsyncLogger>,
        stop: StopFlag,
        resume_after: u64,
        debug: bool,
    ) -> Self {
        let next_sequence = if resume_after == 0 { 0 } else { resume_after + 1 };
        Self {
            recv_queue,
            send_queue,
            pool,
            recovery,
            logger,
            stop,
            next_sequence,
            debug,
        }
    }

    /// Next sequence number the output queue is owed.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Resume as if every sequence up to and including `sequence` had
    /// already been forwarded.
    pub fn set_sequence(&mut self, sequence: u64) {
        self.next_sequence = sequence + 1;
    }

    /// Drain the input queue until stopped.
    pub fn run(&mut self) -> Result<()> {
        logline!(self.logger, "sequencer running at seq {}", self.next_sequence);
        while !self.stop.is_stopped() {
            let Some(lease) = self.recv_queue.dequeue() else {
                thread::yield_now();
                continue;
            };
            self.process(lease)?;
        }
        logline!(self.logger, "sequencer stopped at seq {}", self.next_sequence);
        Ok(())
    }

    /// Handle one record off the input queue.
    pub fn process(&mut self, lease: Lease<P>) -> Result<()> {
        let sequence = lease.sequence_number;
        match sequence.cmp(&self.next_sequence) {
            std::cmp::Ordering::Greater => {
                logline!(
                    self.logger,
                    "gap from {} to {}, initiating recovery",
                    self.next_sequence,
                    sequence - 1
                );
                // Blocking: nothing may pass the sequencer out of order.
                self.recover_range(self.next_sequence, sequence - 1)?;
            }
            std::cmp::Ordering::Less => {
                if self.debug {
                    logline!(
                        self.logger,
                        "stale record dropped: expected {}, got {}",
                        self.next_sequence,
                        sequence
                    );
                }
                return Ok(());
            }
            std::cmp::Ordering::Equal => {}
        }
        if self.debug {
            logline!(self.logger, "sequencer forwarding seq {}", sequence);
        }
        enqueue_spin(self.send_queue.as_ref(), lease);
        self.next_sequence += 1;
        Ok(())
    }

    fn recover_range(&mut self, start: u64, end: u64) -> Result<()> {
        let Self {
            recovery,
            pool,
            send_queue,
            next_sequence,
            logger,
            debug,
            ..
        } = self;
        recovery.recover(start, end, &mut |record: TradeRecord| {
            if record.sequence_number != *next_sequence {
                return Err(Error::UnrecoverableGap {
                    expected: *next_sequence,
                    received: record.sequence_number,
                });
            }
            let Some(mut lease) = pool.allocate() else {
                return Err(Error::PoolExhausted);
            };
            *lease = record;
            if *debug {
                logline!(logger, "recovered seq {}", record.sequence_number);
            }
            enqueue_spin(send_queue.as_ref(), lease);
            *next_sequence += 1;
            Ok(())
        })
    }
}
