//! Periodic multicast publisher replaying the store onto the feed

use crate::store::TradeStore;
use anyhow::{Context, Result};
use common::{ServerConfig, StopFlag};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Emits every store record as one datagram, at a configurable throttle,
/// optionally dropping two records out of every `gap_every` so receivers
/// get real gaps to repair.
pub struct MulticastPublisher {
    store: Arc<TradeStore>,
    socket: UdpSocket,
    target: SocketAddr,
    throttle: Duration,
    gap_every: u64,
    stop: StopFlag,
}

impl MulticastPublisher {
    /// Publisher aimed at the configured multicast group.
    pub fn new(store: Arc<TradeStore>, config: &ServerConfig, stop: StopFlag) -> Result<Self> {
        let target = SocketAddr::from((config.multicast_addr, config.multicast_port));
        Self::with_target(store, target, config.throttle_us, config.gap_every, stop)
    }

    /// Publisher aimed at an explicit address; loopback tests point this
    /// at a plain unicast socket.
    pub fn with_target(
        store: Arc<TradeStore>,
        target: SocketAddr,
        throttle_us: u64,
        gap_every: u64,
        stop: StopFlag,
    ) -> Result<Self> {
        let socket =
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).context("binding publisher socket")?;
        Ok(Self {
            store,
            socket,
            target,
            throttle: Duration::from_micros(throttle_us),
            gap_every,
            stop,
        })
    }

    /// Play the store through once.
    pub fn run(&self) -> Result<()> {
        info!(
            "publishing {} records to {}",
            self.store.len(),
            self.target
        );
        for (index, record) in self.store.records().iter().enumerate() {
            if self.stop.is_stopped() {
                break;
            }
            if self.is_synthetic_gap(index as u64) {
                continue;
            }
            if let Err(e) = self.socket.send_to(&record.encode(), self.target) {
                warn!("failed to send record {index}: {e}");
            }
            if !self.throttle.is_zero() {
                thread::sleep(self.throttle);
            }
        }
        info!("publisher finished");
        Ok(())
    }

    /// The last two records of every `gap_every`-sized block are dropped.
    fn is_synthetic_gap(&self, index: u64) -> bool {
        self.gap_every > 0 && index % self.gap_every >= self.gap_every - 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::messages::TRADE_MESSAGE_TYPE;
    use common::{Symbol, TradeRecord};

    fn store(len: u64) -> Arc<TradeStore> {
        Arc::new(TradeStore::from_records(
            (0..len)
                .map(|i| TradeRecord {
                    message_type: TRADE_MESSAGE_TYPE,
                    sequence_number: i,
                    trade_id: i,
                    timestamp: 1000 + i,
                    price: 10.0,
                    quantity: 1.0,
                    buyer_is_maker: false,
                    best_match: false,
                    symbol: Symbol::new("TEST"),
                })
                .collect(),
        ))
    }

    #[test]
    fn test_replays_whole_store_over_udp() {
        let receiver = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let publisher = MulticastPublisher::with_target(
            store(10),
            receiver.local_addr().unwrap(),
            0,
            0,
            StopFlag::new(),
        )
        .unwrap();
        publisher.run().unwrap();

        let mut buf = [0u8; TradeRecord::WIRE_SIZE];
        let mut sequences = Vec::new();
        for _ in 0..10 {
            let (len, _) = receiver.recv_from(&mut buf).unwrap();
            assert_eq!(len, TradeRecord::WIRE_SIZE);
            sequences.push(TradeRecord::decode(&buf).unwrap().sequence_number);
        }
        assert_eq!(sequences, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_synthetic_gaps_drop_block_tails() {
        let publisher = MulticastPublisher::with_target(
            store(10),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 9)),
            0,
            5,
            StopFlag::new(),
        )
        .unwrap();
        let dropped: Vec<u64> = (0..10)
            .filter(|&i| publisher.is_synthetic_gap(i))
            .collect();
        assert_eq!(dropped, vec![3, 4, 8, 9]);
    }
}
