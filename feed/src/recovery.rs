//! Gap recovery against the snapshot server

use common::{Error, FeedConfig, GapRequest, Result, TradeRecord};
use logger::{logline, AsyncLogger};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Source of missing records, invoked synchronously by the sequencer.
///
/// `on_record` receives the repaired records in ascending order; an error
/// from the callback aborts the drain and propagates.
pub trait RecoverySource {
    /// Deliver every record in the inclusive range `[start, end]`.
    fn recover(
        &mut self,
        start: u64,
        end: u64,
        on_record: &mut dyn FnMut(TradeRecord) -> Result<()>,
    ) -> Result<()>;
}

/// Production recovery client over a connected stream socket.
///
/// The connection is established once at startup with `TCP_NODELAY` and a
/// bounded retry loop. The read timeout doubles as the readiness quantum:
/// a quantum without data logs and retries, a closed stream aborts the
/// recovery as unrecoverable.
pub struct TcpRecovery {
    stream: TcpStream,
    logger: Arc<AsyncLogger>,
}

impl TcpRecovery {
    /// Connect to the configured snapshot endpoint, retrying with a fixed
    /// backoff up to the configured attempt count.
    pub fn connect(config: &FeedConfig, logger: Arc<AsyncLogger>) -> Result<Self> {
        let backoff = Duration::from_millis(config.connect_backoff_ms);
        let mut last_error: Option<std::io::Error> = None;
        for attempt in 1..=config.connect_attempts {
            logline!(
                logger,
                "recovery connecting to {} [attempt:{}]",
                config.recovery_endpoint,
                attempt
            );
            match TcpStream::connect(&config.recovery_endpoint) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream
                        .set_read_timeout(Some(Duration::from_millis(config.recovery_timeout_ms)))?;
                    logline!(logger, "recovery connected");
                    return Ok(Self { stream, logger });
                }
                Err(e) => {
                    last_error = Some(e);
                    thread::sleep(backoff);
                }
            }
        }
        logline!(logger, "recovery failed to connect, giving up");
        Err(last_error
            .map(Error::Io)
            .unwrap_or(Error::InvalidArgument("zero connect attempts configured")))
    }

    /// Read exactly one wire record, riding out readiness timeouts.
    fn read_record(&mut self) -> Result<TradeRecord> {
        let mut buf = [0u8; TradeRecord::WIRE_SIZE];
        let mut filled = 0;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::Protocol(
                        "recovery stream closed mid-drain".to_string(),
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    logline!(self.logger, "recovery quantum elapsed without data, retrying");
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        TradeRecord::decode(&buf)
    }
}

impl RecoverySource for TcpRecovery {
    fn recover(
        &mut self,
        start: u64,
        end: u64,
        on_record: &mut dyn FnMut(TradeRecord) -> Result<()>,
    ) -> Result<()> {
        logline!(self.logger, "recovery requesting [{}, {}]", start, end);
        let request = GapRequest::fill(start, end);
        self.stream.write_all(&request.encode())?;

        let expected = end - start + 1;
        for _ in 0..expected {
            let record = self.read_record()?;
            on_record(record)?;
        }
        Ok(())
    }
}

/// Recovery source backed by an in-memory record slice, indexed by
/// sequence number. Serves offline replays and the sequencer tests,
/// where standing up a snapshot server would add nothing.
pub struct MemoryRecovery {
    records: Vec<TradeRecord>,
}

impl MemoryRecovery {
    /// Records must be dense: `records[i].sequence_number == i`.
    pub fn new(records: Vec<TradeRecord>) -> Self {
        Self { records }
    }
}

impl RecoverySource for MemoryRecovery {
    fn recover(
        &mut self,
        start: u64,
        end: u64,
        on_record: &mut dyn FnMut(TradeRecord) -> Result<()>,
    ) -> Result<()> {
        if start > end || end >= self.records.len() as u64 {
            return Err(Error::InvalidArgument("range outside the record store"));
        }
        for sequence in start..=end {
            on_record(self.records[sequence as usize])?;
        }
        Ok(())
    }
}
