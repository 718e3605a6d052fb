//! Common types for the tickpipe market-data pipeline

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod messages;
pub mod stop;
pub mod types;

pub use config::{AggConfig, BookConfig, Config, FeedConfig, ServerConfig, SinkConfig, SinkMode};
pub use error::{Error, Result};
pub use messages::{GapRequest, TradeRecord};
pub use stop::StopFlag;
pub use types::Symbol;
