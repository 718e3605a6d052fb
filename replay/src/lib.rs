//! Replay side of the pipeline
//!
//! Loads a recorded trade file set once at startup, serves gap-fill and
//! full-replay requests over stream sockets, and can front a periodic
//! multicast publisher that plays the store back onto the feed, with
//! optional synthetic gaps to exercise recovery.

#![deny(warnings)]
#![deny(clippy::all)]

pub mod multicast;
pub mod server;
pub mod snapshot;
pub mod store;

pub use multicast::MulticastPublisher;
pub use server::ReplayServer;
pub use snapshot::SnapshotServer;
pub use store::TradeStore;
