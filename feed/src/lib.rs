//! Receiver-side feed components
//!
//! The multicast receiver turns datagrams into pool-leased records, the
//! sequencer enforces contiguous ordering, and the recovery client
//! repairs gaps against the snapshot server over a stream socket.

#![deny(warnings)]
#![deny(clippy::all)]

pub mod receiver;
pub mod recovery;
pub mod sequencer;

pub use receiver::MulticastReceiver;
pub use recovery::{MemoryRecovery, RecoverySource, TcpRecovery};
pub use sequencer::Sequencer;
