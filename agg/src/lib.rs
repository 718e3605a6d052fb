//! VWAP aggregation and publication

#![deny(warnings)]
#![deny(clippy::all)]

pub mod aggregator;
pub mod publisher;

pub use aggregator::Aggregator;
pub use publisher::{PublishSink, TcpPublisher};
