//! Snapshot server serving a real recovery client over loopback TCP

use common::messages::TRADE_MESSAGE_TYPE;
use common::{FeedConfig, GapRequest, StopFlag, Symbol, TradeRecord};
use feed::{RecoverySource, TcpRecovery};
use logger::AsyncLogger;
use replay::{SnapshotServer, TradeStore};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn store(len: u64) -> Arc<TradeStore> {
    Arc::new(TradeStore::from_records(
        (0..len)
            .map(|i| TradeRecord {
                message_type: TRADE_MESSAGE_TYPE,
                sequence_number: i,
                trade_id: 100 + i,
                timestamp: 1000 + i,
                price: 50.0 + i as f64,
                quantity: 2.0,
                buyer_is_maker: i % 2 == 0,
                best_match: true,
                symbol: Symbol::new("RTT"),
            })
            .collect(),
    ))
}

fn start_server(len: u64) -> (std::net::SocketAddr, StopFlag, thread::JoinHandle<()>) {
    let stop = StopFlag::new();
    let server = SnapshotServer::bind(store(len), 0, stop.clone()).unwrap();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || server.run().unwrap());
    (addr, stop, handle)
}

#[test]
fn recovery_client_drains_requested_range_in_order() {
    let (addr, stop, server) = start_server(100);

    let config = FeedConfig {
        recovery_endpoint: addr.to_string(),
        connect_attempts: 10,
        connect_backoff_ms: 50,
        recovery_timeout_ms: 1000,
        ..FeedConfig::default()
    };
    let logger = Arc::new(AsyncLogger::new(Box::new(std::io::sink()), 64));
    let mut recovery = TcpRecovery::connect(&config, logger).unwrap();

    let mut received = Vec::new();
    recovery
        .recover(10, 29, &mut |record| {
            received.push(record);
            Ok(())
        })
        .unwrap();
    assert_eq!(received.len(), 20);
    for (offset, record) in received.iter().enumerate() {
        assert_eq!(record.sequence_number, 10 + offset as u64);
        assert_eq!(record.trade_id, 110 + offset as u64);
        assert_eq!(record.symbol.as_str(), "RTT");
    }

    // The connection stays open for further requests.
    let mut again = Vec::new();
    recovery
        .recover(0, 0, &mut |record| {
            again.push(record.sequence_number);
            Ok(())
        })
        .unwrap();
    assert_eq!(again, vec![0]);

    stop.stop();
    server.join().unwrap();
}

#[test]
fn replay_all_streams_the_whole_store() {
    let (addr, stop, server) = start_server(25);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
        .write_all(&GapRequest::replay_all().encode())
        .unwrap();

    let mut buf = vec![0u8; TradeRecord::WIRE_SIZE * 25];
    stream.read_exact(&mut buf).unwrap();
    for i in 0..25usize {
        let record =
            TradeRecord::decode(&buf[i * TradeRecord::WIRE_SIZE..(i + 1) * TradeRecord::WIRE_SIZE])
                .unwrap();
        assert_eq!(record.sequence_number, i as u64);
    }

    stop.stop();
    server.join().unwrap();
}

#[test]
fn unknown_request_kind_is_ignored_and_connection_survives() {
    let (addr, stop, server) = start_server(5);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    // An unknown kind byte must be logged and skipped, not kill the
    // connection.
    let mut bogus = GapRequest::fill(0, 1).encode();
    bogus[0] = b'9';
    stream.write_all(&bogus).unwrap();

    stream.write_all(&GapRequest::fill(2, 3).encode()).unwrap();
    let mut buf = [0u8; TradeRecord::WIRE_SIZE * 2];
    stream.read_exact(&mut buf).unwrap();
    assert_eq!(
        TradeRecord::decode(&buf[..TradeRecord::WIRE_SIZE])
            .unwrap()
            .sequence_number,
        2
    );

    stop.stop();
    server.join().unwrap();
}

#[test]
fn invalid_range_is_rejected_without_payload() {
    let (addr, stop, server) = start_server(5);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    stream.write_all(&GapRequest::fill(3, 99).encode()).unwrap();

    let mut buf = [0u8; 1];
    let got = stream.read(&mut buf);
    // Nothing may come back for an out-of-store range.
    assert!(matches!(got, Err(_) | Ok(0)));

    stop.stop();
    server.join().unwrap();
}
