//! Bounded queue family
//!
//! Queues move owned handles between pipeline stages: ownership of the
//! payload transfers on `enqueue` and is reacquired on `dequeue`.
//! `enqueue` fails exactly when the queue is full (handing the value
//! back), `dequeue` returns `None` exactly when it is empty. The SPSC and
//! MPMC variants differ only in their permitted caller counts.

#![deny(warnings)]
#![deny(clippy::all)]

pub mod locked;
pub mod mpmc;
pub mod spsc;

pub use locked::LockedQueue;
pub use mpmc::MpmcRing;
pub use spsc::SpscRing;

use std::thread;

/// Capability shared by every queue variant.
pub trait Queue<T>: Send + Sync {
    /// Hand the value to the queue, or get it back when the queue is full.
    fn enqueue(&self, item: T) -> Result<(), T>;

    /// Take the oldest value, or `None` when the queue is empty.
    fn dequeue(&self) -> Option<T>;
}

/// Enqueue that treats a full queue as backpressure: spin with yields
/// until the consumer makes room. Used by producers that must not drop
/// (the sequencer's ordered output, the fan-out stage).
pub fn enqueue_spin<T, Q: Queue<T>>(queue: &Q, mut item: T) {
    loop {
        match queue.enqueue(item) {
            Ok(()) => return,
            Err(rejected) => {
                item = rejected;
                thread::yield_now();
            }
        }
    }
}
