//! Multicast trade receiver

use common::{Error, FeedConfig, Result, StopFlag, TradeRecord};
use logger::{logline, AsyncLogger};
use pool::{Lease, PoolAlloc, PoolCore};
use queue::Queue;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

/// How long a blocked `recv` may hide a stop request.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Reads one trade record per datagram, leases a slot from the pool and
/// hands the record to the sequencer's input queue.
///
/// Datagram loss is tolerated here; repairing the stream is the
/// sequencer's job. A full queue likewise drops the record on the floor,
/// which the sequencer sees as a gap.
pub struct MulticastReceiver<P, Q>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
{
    socket: UdpSocket,
    pool: Arc<P>,
    queue: Arc<Q>,
    logger: Arc<AsyncLogger>,
    stop: StopFlag,
    debug: bool,
}

impl<P, Q> MulticastReceiver<P, Q>
where
    P: PoolCore<Item = TradeRecord>,
    Q: Queue<Lease<P>>,
{
    /// Bind the feed port and join the configured group.
    ///
    /// A non-multicast address skips the membership join, which lets
    /// loopback tests drive the receiver over plain unicast datagrams.
    pub fn bind(
        config: &FeedConfig,
        pool: Arc<P>,
        queue: Arc<Q>,
        logger: Arc<AsyncLogger>,
        stop: StopFlag,
    ) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.multicast_port))?;
        if config.multicast_addr.is_multicast() {
            socket.join_multicast_v4(&config.multicast_addr, &Ipv4Addr::UNSPECIFIED)?;
        }
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        logline!(logger, "receiver bound on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            pool,
            queue,
            logger,
            stop,
            debug: config.debug,
        })
    }

    /// Address the receiver actually bound, for tests driving it over an
    /// ephemeral port.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Consume datagrams until stopped.
    ///
    /// Pool exhaustion in this hot path is unrecoverable: losing the
    /// ability to lease records means the stream is already being dropped
    /// wholesale, so the component terminates instead of spinning.
    pub fn run(&self) -> Result<()> {
        logline!(self.logger, "receiver running");
        let mut buf = [0u8; TradeRecord::WIRE_SIZE];
        while !self.stop.is_stopped() {
            let len = match self.socket.recv(&mut buf) {
                Ok(len) => len,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => {
                    logline!(self.logger, "receiver recv failed: {}", e);
                    continue;
                }
            };
            if len != TradeRecord::WIRE_SIZE {
                logline!(
                    self.logger,
                    "receiver short datagram: {} of {} bytes",
                    len,
                    TradeRecord::WIRE_SIZE
                );
                continue;
            }
            let record = match TradeRecord::decode(&buf) {
                Ok(record) => record,
                Err(e) => {
                    logline!(self.logger, "receiver dropped malformed datagram: {}", e);
                    continue;
                }
            };
            let Some(mut lease) = self.pool.allocate() else {
                return Err(Error::PoolExhausted);
            };
            *lease = record;
            if self.queue.enqueue(lease).is_err() && self.debug {
                logline!(
                    self.logger,
                    "receiver queue full, dropped seq {}",
                    record.sequence_number
                );
            }
        }
        logline!(self.logger, "receiver stopped");
        Ok(())
    }
}
