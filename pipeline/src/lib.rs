//! Receiver-side pipeline assembly
//!
//! Composes the canonical topology: receiver -> recvQ -> sequencer ->
//! sendQ -> fan-out -> one SPSC queue per consumer (db sink, aggregator,
//! order book builder). Each stage runs on its own thread with a shared
//! stop flag.

#![deny(warnings)]
#![deny(clippy::all)]

pub mod builder;
pub mod fanout;
pub mod runner;

pub use builder::BookBuilder;
pub use fanout::{Branch, FanOut};
pub use runner::{PipelineHandle, ReceiverPipeline};
