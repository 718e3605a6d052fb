//! Error kinds shared across the pipeline

use thiserror::Error;

/// Convenience alias used throughout the library crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of the pipeline components.
///
/// Queue-empty is deliberately absent: an empty dequeue is a normal outcome
/// and is expressed as `Option::None` at the queue API.
#[derive(Debug, Error)]
pub enum Error {
    /// An object pool had no free slot for a hot-path allocation.
    #[error("object pool exhausted")]
    PoolExhausted,

    /// A bounded queue rejected an enqueue.
    #[error("queue full")]
    QueueFull,

    /// Caller handed in something the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Lookup of an id that is not present.
    #[error("not found")]
    NotFound,

    /// A fixed-capacity structure ran out of backing storage.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// Underlying socket or file failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed frame: short read, bad length or unknown message type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Recovery delivered a record out of sequence; the stream cannot be
    /// reconstructed and the component must terminate.
    #[error("unrecoverable gap: expected sequence {expected}, received {received}")]
    UnrecoverableGap {
        /// Sequence number the sequencer was waiting for.
        expected: u64,
        /// Sequence number the recovery stream actually delivered.
        received: u64,
    },
}

impl Error {
    /// True for conditions that must terminate the owning component and
    /// propagate to the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted | Self::UnrecoverableGap { .. }
        )
    }
}
