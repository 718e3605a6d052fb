//! Fire-and-forget pub/sub publication over TCP

use anyhow::{Context, Result};
use common::StopFlag;
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Where published lines go. The production sink is [`TcpPublisher`];
/// tests capture lines in memory.
pub trait PublishSink: Send {
    /// Publish one line to every current subscriber. Fire-and-forget:
    /// delivery failures drop the subscriber, never the publisher.
    fn publish(&mut self, line: &str);
}

/// Single-topic publisher: an accept thread collects subscribers, and
/// every published line is written to all of them. Dead subscribers are
/// dropped on the next publish.
pub struct TcpPublisher {
    subscribers: Arc<Mutex<Vec<TcpStream>>>,
    acceptor: Option<thread::JoinHandle<()>>,
    local_addr: SocketAddr,
    stop: StopFlag,
}

impl TcpPublisher {
    /// Bind the subscription port and start accepting.
    pub fn bind(port: u16, stop: StopFlag) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .with_context(|| format!("binding publisher on port {port}"))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!("vwap publisher listening on {local_addr}");

        let subscribers: Arc<Mutex<Vec<TcpStream>>> = Arc::new(Mutex::new(Vec::new()));
        let acceptor = {
            let subscribers = Arc::clone(&subscribers);
            let stop = stop.clone();
            thread::spawn(move || accept_loop(&listener, &subscribers, &stop))
        };
        Ok(Self {
            subscribers,
            acceptor: Some(acceptor),
            local_addr,
            stop,
        })
    }

    /// Address the publisher actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl PublishSink for TcpPublisher {
    fn publish(&mut self, line: &str) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain_mut(|subscriber| {
            subscriber
                .write_all(line.as_bytes())
                .and_then(|()| subscriber.write_all(b"\n"))
                .is_ok()
        });
    }
}

impl Drop for TcpPublisher {
    fn drop(&mut self) {
        self.stop.stop();
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

fn accept_loop(listener: &TcpListener, subscribers: &Mutex<Vec<TcpStream>>, stop: &StopFlag) {
    while !stop.is_stopped() {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("vwap subscriber {peer} connected");
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("subscriber {peer}: {e}");
                }
                subscribers.lock().push(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => warn!("vwap accept failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    #[test]
    fn test_lines_reach_every_subscriber() {
        let stop = StopFlag::new();
        let mut publisher = TcpPublisher::bind(0, stop.clone()).unwrap();

        let first = TcpStream::connect(publisher.local_addr()).unwrap();
        let second = TcpStream::connect(publisher.local_addr()).unwrap();
        while publisher.subscriber_count() < 2 {
            thread::yield_now();
        }

        publisher.publish("ETHUSDC,1750377600,2516.420000");
        publisher.publish("BTCUSDC,1750377600,64210.125000");

        for stream in [first, second] {
            let mut lines = BufReader::new(stream).lines();
            assert_eq!(
                lines.next().unwrap().unwrap(),
                "ETHUSDC,1750377600,2516.420000"
            );
            assert_eq!(
                lines.next().unwrap().unwrap(),
                "BTCUSDC,1750377600,64210.125000"
            );
        }
    }

    #[test]
    fn test_dead_subscriber_is_dropped_silently() {
        let stop = StopFlag::new();
        let mut publisher = TcpPublisher::bind(0, stop.clone()).unwrap();

        let subscriber = TcpStream::connect(publisher.local_addr()).unwrap();
        while publisher.subscriber_count() < 1 {
            thread::yield_now();
        }
        drop(subscriber);

        // Peer reset surfaces on some write after the close; both must
        // leave the publisher alive with the subscriber culled.
        publisher.publish("AAAA,1,1.000000");
        publisher.publish("AAAA,2,1.000000");
        publisher.publish("AAAA,3,1.000000");
        assert!(publisher.subscriber_count() <= 1);
    }
}
